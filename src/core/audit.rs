//! Audit sink implementations.
//!
//! Every queue and status decision a control takes is reported as an
//! [`AuditEvent`]. Sinks are optional; the in-memory sink keeps a bounded
//! window of recent events for tests and operator inspection.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happened to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Fresh entity flipped to `PROCESSING` and queued.
    Enqueued,
    /// `TEMPORARY_ERROR` entity queued again.
    Retried,
    /// Orphaned `PROCESSING` entity queued again.
    Resubmitted,
    /// Already-queued id moved to the pop end.
    Cut,
    /// Id popped and entity loaded.
    Dequeued,
    /// Popped id has no entity.
    NotFound,
    /// Popped entity already terminal.
    Stale,
    /// Entity exhausted its attempts before processing.
    MaxAttemptsReached,
    /// Handler succeeded and the outcome was stored.
    Succeeded,
    /// Handler failed with a retryable error; stored as `TEMPORARY_ERROR`.
    TemporaryError,
    /// Handler failed for good; stored as `FAILED`.
    Failed,
    /// Outcome update affected no row; someone else moved the entity first.
    LostRace,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Enqueued => "enqueued",
            Self::Retried => "retried",
            Self::Resubmitted => "resubmitted",
            Self::Cut => "cut",
            Self::Dequeued => "dequeued",
            Self::NotFound => "not_found",
            Self::Stale => "stale",
            Self::MaxAttemptsReached => "max_attempts_reached",
            Self::Succeeded => "succeeded",
            Self::TemporaryError => "temporary_error",
            Self::Failed => "failed",
            Self::LostRace => "lost_race",
        };
        f.write_str(name)
    }
}

/// Audit event structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event identifier.
    pub event_id: String,
    /// Name of the reporting control.
    pub control: String,
    /// Related entity identifier.
    pub entity_id: String,
    /// Action taken.
    pub action: AuditAction,
    /// Timestamp.
    pub created_at: DateTime<Utc>,
    /// Additional context.
    pub detail: Option<String>,
}

/// Audit sink abstraction.
pub trait AuditSink: Send {
    /// Record an audit event.
    fn record(&mut self, event: AuditEvent);
}

/// In-memory audit sink for testing and dev.
///
/// Clones share the same buffer, so a test can keep one handle and give
/// another to the control.
#[derive(Clone)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<VecDeque<AuditEvent>>>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(max_events.min(1024)))),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Number of stored events with `action` for `entity_id`.
    #[must_use]
    pub fn count(&self, entity_id: &str, action: AuditAction) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.entity_id == entity_id && e.action == action)
            .count()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&mut self, event: AuditEvent) {
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }
}

/// Helper to build an audit event stamped now.
pub fn build_audit_event(
    control: impl Into<String>,
    entity_id: impl Into<String>,
    action: AuditAction,
    detail: Option<String>,
) -> AuditEvent {
    AuditEvent {
        event_id: Uuid::new_v4().to_string(),
        control: control.into(),
        entity_id: entity_id.into(),
        action,
        created_at: Utc::now(),
        detail,
    }
}
