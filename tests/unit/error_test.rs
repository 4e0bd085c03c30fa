//! Tests for error types

use prometheus_polling_control::core::{ControlError, PoolError, PollingStatus};

#[test]
fn test_store_error() {
    let err = ControlError::Store("connection refused".to_string());
    assert_eq!(format!("{err}"), "store error: connection refused");
}

#[test]
fn test_queue_error() {
    let err = ControlError::Queue("broken pipe".to_string());
    assert_eq!(format!("{err}"), "queue error: broken pipe");
}

#[test]
fn test_invalid_transition_error() {
    let err = ControlError::InvalidTransition {
        from: PollingStatus::Failed,
        to: PollingStatus::Successful,
    };
    assert_eq!(
        format!("{err}"),
        "invalid status transition: FAILED -> SUCCESSFUL"
    );
}

#[test]
fn test_invalid_field_error() {
    let err = ControlError::InvalidField("status".to_string());
    assert_eq!(format!("{err}"), "invalid field `status`");
}

#[test]
fn test_shutdown_error() {
    assert_eq!(
        format!("{}", ControlError::Shutdown),
        "polling control has been shut down"
    );
}

#[test]
fn test_pool_errors() {
    assert_eq!(format!("{}", PoolError::Saturated), "all drain slots are busy");
    assert_eq!(
        format!("{}", PoolError::InvalidConfig("threads must be greater than 0".into())),
        "invalid configuration: threads must be greater than 0"
    );
}

#[test]
fn test_control_error_converts_to_anyhow() {
    let err: anyhow::Error = ControlError::Lock("timeout".into()).into();
    assert!(err.downcast_ref::<ControlError>().is_some());
}
