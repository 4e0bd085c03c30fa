//! Polled entity model and the status state machine.
//!
//! An entity is a unit of pending work owned by the calling application. The
//! controller only ever reads the polling columns (`id`, `status`, `attempts`,
//! `create_date`, `modify_date`, `error_info`) and mutates them through
//! conditional updates, see [`crate::core::update::ConditionalUpdate`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::ControlError;

/// Field values returned by a handler, persisted alongside the outcome.
///
/// Ordered so that rendered updates are deterministic.
pub type FieldValues = BTreeMap<String, serde_json::Value>;

/// Lifecycle status of a polled entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PollingStatus {
    /// Created by the application, not yet picked up.
    Initialized,
    /// Claimed by a scheduler and placed on the work queue.
    Processing,
    /// Last attempt failed with a retryable error.
    TemporaryError,
    /// Handler succeeded. Terminal.
    Successful,
    /// Attempts exhausted or permanent error. Terminal.
    Failed,
}

impl PollingStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Initialized,
        Self::Processing,
        Self::TemporaryError,
        Self::Successful,
        Self::Failed,
    ];

    /// Stored text representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initialized => "INITIALIZED",
            Self::Processing => "PROCESSING",
            Self::TemporaryError => "TEMPORARY_ERROR",
            Self::Successful => "SUCCESSFUL",
            Self::Failed => "FAILED",
        }
    }

    /// `SUCCESSFUL` and `FAILED` never transition again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Successful | Self::Failed)
    }

    /// Whether the state machine allows moving from `self` to `to`.
    ///
    /// `INITIALIZED -> PROCESSING` is the only way into `PROCESSING`; every
    /// non-terminal status may move to an outcome status. A worker may pick up
    /// a `TEMPORARY_ERROR` entity directly, so no flip back to `PROCESSING` is
    /// required before an outcome is recorded.
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        match to {
            Self::Initialized => false,
            Self::Processing => matches!(self, Self::Initialized),
            Self::TemporaryError | Self::Successful | Self::Failed => true,
        }
    }
}

impl fmt::Display for PollingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PollingStatus {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ControlError::Store(format!("unknown polling status `{s}`")))
    }
}

/// An application entity processed by a polling control.
///
/// Replaces runtime type discovery: the controller is generic over `E` and
/// asks the type for its logical name instead of inspecting itself.
pub trait PollingEntity: Clone + fmt::Debug + Send + Sync + 'static {
    /// Logical name of the entity type; default queue name and table name.
    fn entity_name() -> &'static str;

    /// Stable unique identifier.
    fn id(&self) -> &str;
    /// Current status.
    fn status(&self) -> PollingStatus;
    /// Number of processing attempts recorded so far.
    fn attempts(&self) -> u32;
    /// Creation time; fixes FIFO order of the initial enqueue.
    fn create_date(&self) -> DateTime<Utc>;
    /// Last modification time; drives retry windows and crash recovery.
    fn modify_date(&self) -> DateTime<Utc>;
    /// Last failure detail, if any.
    fn error_info(&self) -> Option<&str>;

    /// Set the status.
    fn set_status(&mut self, status: PollingStatus);
    /// Set the attempt counter.
    fn set_attempts(&mut self, attempts: u32);
    /// Set the modification time.
    fn set_modify_date(&mut self, at: DateTime<Utc>);
    /// Set or clear the failure detail.
    fn set_error_info(&mut self, info: Option<String>);

    /// Write a handler-provided field. Entities without extra fields reject all names.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidField`] for names the entity does not carry.
    fn set_field(&mut self, name: &str, _value: &serde_json::Value) -> Result<(), ControlError> {
        Err(ControlError::InvalidField(name.to_string()))
    }
}

/// Ready-made entity with a JSON payload and an open set of result fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingRecord {
    /// Identifier.
    pub id: String,
    /// Current status.
    pub status: PollingStatus,
    /// Attempts so far.
    pub attempts: u32,
    /// Creation time.
    pub create_date: DateTime<Utc>,
    /// Last modification time.
    pub modify_date: DateTime<Utc>,
    /// Last failure detail.
    pub error_info: Option<String>,
    /// Work description supplied by the application.
    pub payload: serde_json::Value,
    /// Result fields written by handlers.
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl PollingRecord {
    /// New `INITIALIZED` record created at `now`.
    pub fn new(id: impl Into<String>, payload: serde_json::Value, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            status: PollingStatus::Initialized,
            attempts: 0,
            create_date: now,
            modify_date: now,
            error_info: None,
            payload,
            fields: serde_json::Map::new(),
        }
    }

    /// Override status and attempts, e.g. to seed a store in tests.
    #[must_use]
    pub fn with_state(mut self, status: PollingStatus, attempts: u32) -> Self {
        self.status = status;
        self.attempts = attempts;
        self
    }

    /// Override the modification time.
    #[must_use]
    pub fn modified_at(mut self, at: DateTime<Utc>) -> Self {
        self.modify_date = at;
        self
    }
}

impl fmt::Display for PollingRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}, attempts={}]",
            self.id, self.status, self.attempts
        )
    }
}

impl PollingEntity for PollingRecord {
    fn entity_name() -> &'static str {
        "polling_record"
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> PollingStatus {
        self.status
    }

    fn attempts(&self) -> u32 {
        self.attempts
    }

    fn create_date(&self) -> DateTime<Utc> {
        self.create_date
    }

    fn modify_date(&self) -> DateTime<Utc> {
        self.modify_date
    }

    fn error_info(&self) -> Option<&str> {
        self.error_info.as_deref()
    }

    fn set_status(&mut self, status: PollingStatus) {
        self.status = status;
    }

    fn set_attempts(&mut self, attempts: u32) {
        self.attempts = attempts;
    }

    fn set_modify_date(&mut self, at: DateTime<Utc>) {
        self.modify_date = at;
    }

    fn set_error_info(&mut self, info: Option<String>) {
        self.error_info = info;
    }

    fn set_field(&mut self, name: &str, value: &serde_json::Value) -> Result<(), ControlError> {
        self.fields.insert(name.to_string(), value.clone());
        Ok(())
    }
}
