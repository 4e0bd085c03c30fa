//! Tests for audit sink

use prometheus_polling_control::core::{build_audit_event, AuditAction, AuditSink, InMemoryAuditSink};

#[test]
fn test_in_memory_audit_sink() {
    let mut sink = InMemoryAuditSink::new(10);

    let event = build_audit_event(
        "orderControl",
        "order-1",
        AuditAction::Enqueued,
        Some("fresh".to_string()),
    );

    sink.record(event.clone());
    assert_eq!(sink.events().len(), 1);

    let events = sink.events();
    assert_eq!(events[0].event_id, event.event_id);
    assert_eq!(events[0].control, "orderControl");
    assert_eq!(events[0].entity_id, "order-1");
    assert_eq!(events[0].action, AuditAction::Enqueued);
}

#[test]
fn test_audit_sink_overflow() {
    let mut sink = InMemoryAuditSink::new(2);

    sink.record(build_audit_event("c", "e1", AuditAction::Dequeued, None));
    sink.record(build_audit_event("c", "e2", AuditAction::Dequeued, None));
    sink.record(build_audit_event("c", "e3", AuditAction::Dequeued, None));

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].entity_id, "e2"); // First one popped
    assert_eq!(events[1].entity_id, "e3");
}

#[test]
fn test_clones_share_events() {
    let sink = InMemoryAuditSink::new(10);
    let mut writer = sink.clone();
    writer.record(build_audit_event("c", "e1", AuditAction::LostRace, None));
    writer.record(build_audit_event("c", "e1", AuditAction::Succeeded, None));
    assert_eq!(sink.count("e1", AuditAction::LostRace), 1);
    assert_eq!(sink.count("e1", AuditAction::Failed), 0);
}

#[test]
fn test_event_ids_are_unique() {
    let a = build_audit_event("c", "e1", AuditAction::Cut, None);
    let b = build_audit_event("c", "e1", AuditAction::Cut, None);
    assert_ne!(a.event_id, b.event_id);
}

#[test]
fn test_action_serialization() {
    let json = serde_json::to_string(&AuditAction::MaxAttemptsReached).unwrap();
    assert_eq!(json, "\"max_attempts_reached\"");
    assert_eq!(AuditAction::TemporaryError.to_string(), "temporary_error");
}
