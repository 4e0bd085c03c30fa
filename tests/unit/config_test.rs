//! Tests for configuration validation

use prometheus_polling_control::config::{
    ControlConfig, LockBackendConfig, PollingConfig, QueueBackendConfig,
};

#[test]
fn test_control_config_defaults() {
    let cfg = ControlConfig::default();
    assert_eq!(cfg.threads, 5);
    assert_eq!(cfg.max_attempts, 3);
    assert_eq!(cfg.interval_factor_secs, 60);
    assert_eq!(cfg.resubmit_interval_secs, 600);
    assert_eq!(cfg.batch_size, 50);
    assert_eq!(cfg.retry_batch_size, 10);
    assert_eq!(cfg.enqueue_rate_ms, 10_000);
    assert_eq!(cfg.dequeue_delay_ms, 10_000);
    assert!(cfg.queue_name.is_none());
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_control_config_invalid_threads() {
    let cfg = ControlConfig::default().with_threads(0);
    assert!(cfg.validate().is_err());
}

#[test]
fn test_control_config_invalid_max_attempts() {
    let cfg = ControlConfig::default().with_max_attempts(0);
    assert!(cfg.validate().is_err());
}

#[test]
fn test_control_config_invalid_batch_size() {
    assert!(ControlConfig::default().with_batch_size(0).validate().is_err());
    assert!(ControlConfig::default().with_retry_batch_size(0).validate().is_err());
}

#[test]
fn test_control_config_blank_queue_name() {
    let cfg = ControlConfig::default().with_queue_name("  ");
    assert!(cfg.validate().is_err());
}

#[test]
fn test_retry_delay_scales_with_attempt() {
    let cfg = ControlConfig::default().with_interval_factor_secs(60);
    assert_eq!(cfg.retry_delay(1), chrono::Duration::seconds(60));
    assert_eq!(cfg.retry_delay(3), chrono::Duration::seconds(180));
    assert_eq!(cfg.resubmit_interval(), chrono::Duration::seconds(600));
}

#[test]
fn test_huge_intervals_saturate() {
    let cfg = ControlConfig::default().with_interval_factor_secs(u64::MAX);
    assert_eq!(cfg.retry_delay(2), chrono::Duration::MAX);
}

#[test]
fn test_control_config_partial_json() {
    let cfg = ControlConfig::from_json_str(r#"{"threads": 8, "max_attempts": 5}"#).unwrap();
    assert_eq!(cfg.threads, 8);
    assert_eq!(cfg.max_attempts, 5);
    assert_eq!(cfg.batch_size, 50);
}

#[test]
fn test_control_config_json_rejects_invalid() {
    assert!(ControlConfig::from_json_str(r#"{"threads": 0}"#).is_err());
    assert!(ControlConfig::from_json_str("not json").is_err());
}

#[test]
fn test_control_config_env_overrides() {
    std::env::set_var("PCTEST_THREADS", "7");
    std::env::set_var("PCTEST_MAX_ATTEMPTS", "4");
    std::env::set_var("PCTEST_QUEUE_NAME", "orders");
    let cfg = ControlConfig::from_env("PCTEST").unwrap();
    assert_eq!(cfg.threads, 7);
    assert_eq!(cfg.max_attempts, 4);
    assert_eq!(cfg.queue_name.as_deref(), Some("orders"));
    assert_eq!(cfg.batch_size, 50);
}

#[test]
fn test_control_config_env_rejects_garbage() {
    std::env::set_var("PCBAD_BATCH_SIZE", "lots");
    let err = ControlConfig::from_env("PCBAD").unwrap_err();
    assert!(err.contains("PCBAD_BATCH_SIZE"));
}

#[test]
fn test_polling_config_from_json() {
    let json = r#"{
        "queue": {"kind": "file", "dir": "/tmp/queues"},
        "lock": {"kind": "in_memory"},
        "controls": {
            "orderControl": {"threads": 2, "interval_factor_secs": 30}
        }
    }"#;
    let cfg = PollingConfig::from_json_str(json).unwrap();
    assert_eq!(
        cfg.queue,
        QueueBackendConfig::File {
            dir: "/tmp/queues".into()
        }
    );
    assert_eq!(cfg.lock, LockBackendConfig::InMemory);
    assert_eq!(cfg.control("orderControl").threads, 2);
    assert_eq!(cfg.control("orderControl").interval_factor_secs, 30);
    assert_eq!(cfg.control("otherControl"), ControlConfig::default());
}

#[test]
fn test_polling_config_reports_invalid_control() {
    let json = r#"{"controls": {"broken": {"threads": 0}}}"#;
    let err = PollingConfig::from_json_str(json).unwrap_err();
    assert!(err.contains("broken"));
}

#[test]
fn test_polling_config_rejects_empty_url() {
    let cfg = PollingConfig {
        lock: LockBackendConfig::Postgres { url: String::new() },
        ..PollingConfig::default()
    };
    assert!(cfg.validate().is_err());
}
