//! Shared fixtures for control integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use parking_lot::Mutex;
use prometheus_polling_control::builders::PollingControlBuilder;
use prometheus_polling_control::config::ControlConfig;
use prometheus_polling_control::core::{
    EntityStore, FieldValues, InMemoryAuditSink, PollingControl, PollingHandler, PollingRecord,
};
use prometheus_polling_control::infra::{
    InMemoryEntityStore, InMemoryLockService, InMemoryQueue, InMemorySession,
};
use prometheus_polling_control::util::{Clock, ManualClock};

pub type Store = InMemoryEntityStore<PollingRecord>;
pub type Session = InMemorySession<PollingRecord>;

/// Scripted handler behaviour for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Succeed,
    Temporary,
    Permanent,
}

pub fn io_failure(message: &str) -> anyhow::Error {
    anyhow::Error::new(std::io::Error::new(
        std::io::ErrorKind::ConnectionReset,
        message.to_string(),
    ))
}

/// Plays `steps` in order, then succeeds.
pub struct ScriptedHandler {
    steps: Mutex<VecDeque<Step>>,
    pub calls: Arc<AtomicUsize>,
}

impl ScriptedHandler {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn always(step: Step) -> Self {
        Self::new(std::iter::repeat_n(step, 64))
    }
}

#[async_trait]
impl PollingHandler<PollingRecord, Session> for ScriptedHandler {
    async fn handle(&self, entity: &PollingRecord) -> anyhow::Result<FieldValues> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let step = self.steps.lock().pop_front().unwrap_or(Step::Succeed);
        match step {
            Step::Succeed => {
                let mut fields = FieldValues::new();
                fields.insert("receipt".into(), format!("{}-{call}", entity.id).into());
                Ok(fields)
            }
            Step::Temporary => Err(io_failure("downstream reset")),
            Step::Permanent => Err(anyhow::anyhow!("payload rejected")),
        }
    }
}

pub struct Harness<H> {
    pub control: PollingControl<PollingRecord, Store, H>,
    pub store: Arc<Store>,
    pub queue: InMemoryQueue,
    pub lock: InMemoryLockService,
    pub clock: ManualClock,
    pub audit: InMemoryAuditSink,
}

pub fn harness<H>(config: ControlConfig, handler: H) -> Harness<H>
where
    H: PollingHandler<PollingRecord, Session>,
{
    let store = Arc::new(Store::new());
    let queue = InMemoryQueue::new();
    let lock = InMemoryLockService::new();
    let clock = ManualClock::default();
    let audit = InMemoryAuditSink::new(1_000);
    let control = PollingControlBuilder::new("recordControl")
        .config(config)
        .store(Arc::clone(&store))
        .queue(Arc::new(queue.clone()))
        .lock(Arc::new(lock.node()))
        .handler(handler)
        .clock(clock.clone())
        .audit(audit.clone())
        .build()
        .expect("control builds");
    Harness {
        control,
        store,
        queue,
        lock,
        clock,
        audit,
    }
}

impl<H> Harness<H>
where
    H: PollingHandler<PollingRecord, Session>,
{
    /// Insert an `INITIALIZED` record created `age_secs` ago.
    pub async fn create(&self, id: &str, age_secs: i64) -> PollingRecord {
        let created = self.clock.now() - Duration::seconds(age_secs);
        let record = PollingRecord::new(id, serde_json::json!({ "id": id }), created);
        self.store.insert(record.clone()).await;
        record
    }

    pub async fn entity(&self, id: &str) -> PollingRecord {
        self.store
            .get(id)
            .await
            .expect("in-memory get")
            .unwrap_or_else(|| panic!("entity {id} exists"))
    }

    pub fn queued(&self) -> Vec<String> {
        self.queue.snapshot(self.control.queue_name())
    }
}
