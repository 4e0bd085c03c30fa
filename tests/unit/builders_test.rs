//! Tests for builder modules

use std::sync::Arc;

use async_trait::async_trait;
use prometheus_polling_control::builders::{build_lock, build_queue, PollingControlBuilder};
use prometheus_polling_control::config::{
    ControlConfig, LockBackendConfig, PollingConfig, QueueBackendConfig,
};
use prometheus_polling_control::core::{
    ControlError, FieldValues, LockService, PollingHandler, PollingRecord, QueueBackend,
};
use prometheus_polling_control::infra::{InMemoryEntityStore, InMemoryLockService, InMemorySession};

struct Noop;

#[async_trait]
impl PollingHandler<PollingRecord, InMemorySession<PollingRecord>> for Noop {
    async fn handle(&self, _entity: &PollingRecord) -> anyhow::Result<FieldValues> {
        Ok(FieldValues::new())
    }
}

type Builder = PollingControlBuilder<PollingRecord, InMemoryEntityStore<PollingRecord>, Noop>;

#[tokio::test]
async fn test_builder_defaults() {
    let control = Builder::new("recordControl")
        .store(Arc::new(InMemoryEntityStore::new()))
        .handler(Noop)
        .build()
        .unwrap();
    assert_eq!(control.name(), "recordControl");
    assert_eq!(control.queue_name(), "polling_record");
    assert_eq!(control.enqueue_lock_name(), "recordControl.enqueue()");
    assert_eq!(control.config(), &ControlConfig::default());
    assert_eq!(control.queue_depth().await.unwrap(), 0);
}

#[tokio::test]
async fn test_builder_requires_store_and_handler() {
    let missing_store = Builder::new("c").handler(Noop).build();
    assert!(matches!(missing_store, Err(ControlError::Config(_))));

    let missing_handler = Builder::new("c")
        .store(Arc::new(InMemoryEntityStore::new()))
        .build();
    assert!(matches!(missing_handler, Err(ControlError::Config(_))));
}

#[tokio::test]
async fn test_builder_rejects_invalid_config() {
    let result = Builder::new("c")
        .config(ControlConfig::default().with_threads(0))
        .store(Arc::new(InMemoryEntityStore::new()))
        .handler(Noop)
        .build();
    assert!(matches!(result, Err(ControlError::Config(_))));
}

#[tokio::test]
async fn test_builder_from_polling_config() {
    let cfg = PollingConfig::from_json_str(
        r#"{"controls": {"recordControl": {"threads": 2, "queue_name": "records"}}}"#,
    )
    .unwrap();
    let control = Builder::from_polling_config("recordControl", &cfg)
        .store(Arc::new(InMemoryEntityStore::new()))
        .handler(Noop)
        .build()
        .unwrap();
    assert_eq!(control.config().threads, 2);
    assert_eq!(control.queue_name(), "records");
}

#[test]
fn test_builder_outside_runtime_needs_spawner() {
    let result = Builder::new("c")
        .store(Arc::new(InMemoryEntityStore::new()))
        .handler(Noop)
        .build();
    assert!(matches!(result, Err(ControlError::Config(_))));
}

#[tokio::test]
async fn test_build_queue_backends() {
    let memory = build_queue(&QueueBackendConfig::InMemory).await.unwrap();
    memory.push_left("q", &["a".to_string()]).await.unwrap();
    assert_eq!(memory.size("q").await.unwrap(), 1);

    let dir = std::env::temp_dir().join(format!("polling-build-queue-{}", uuid::Uuid::new_v4()));
    let file = build_queue(&QueueBackendConfig::File { dir: dir.clone() })
        .await
        .unwrap();
    file.push_left("q", &["a".to_string()]).await.unwrap();
    assert!(dir.join("q.jsonl").exists());
    std::fs::remove_dir_all(&dir).ok();
}

#[cfg(not(feature = "postgres"))]
#[tokio::test]
async fn test_postgres_backends_need_feature() {
    let queue = build_queue(&QueueBackendConfig::Postgres {
        url: "postgres://localhost/db".into(),
    })
    .await;
    assert!(matches!(queue, Err(ControlError::Config(_))));

    let lock = build_lock(&LockBackendConfig::Postgres {
        url: "postgres://localhost/db".into(),
    })
    .await;
    assert!(matches!(lock, Err(ControlError::Config(_))));
}

#[tokio::test]
async fn test_build_in_memory_lock() {
    let lock = build_lock(&LockBackendConfig::InMemory).await.unwrap();
    assert!(lock.try_lock("x").await.unwrap());
    assert!(!lock.try_lock("x").await.unwrap());
}

/// Collects formatted log output.
#[derive(Clone, Default)]
struct LogBuffer(Arc<parking_lot::Mutex<Vec<u8>>>);

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn build_logged(with_lock: bool) -> String {
    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    tracing::subscriber::with_default(subscriber, || {
        let mut builder = Builder::new("recordControl")
            .store(Arc::new(InMemoryEntityStore::new()))
            .handler(Noop);
        if with_lock {
            builder = builder.lock(Arc::new(InMemoryLockService::new()));
        }
        builder.build().unwrap();
    });
    let bytes = logs.0.lock().clone();
    String::from_utf8(bytes).unwrap()
}

#[tokio::test]
async fn test_default_lock_is_reported() {
    let logs = build_logged(false);
    assert!(logs.contains("no lock service configured"), "logs: {logs}");

    let logs = build_logged(true);
    assert!(!logs.contains("no lock service configured"), "logs: {logs}");
}
