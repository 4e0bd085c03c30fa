//! Error types for polling control operations.

use thiserror::Error;

use crate::core::entity::PollingStatus;

/// Errors produced by polling control components.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Entity store failure (connection, query, mapping).
    #[error("store error: {0}")]
    Store(String),
    /// Work queue backing store failure.
    #[error("queue error: {0}")]
    Queue(String),
    /// Distributed lock service failure.
    #[error("lock error: {0}")]
    Lock(String),
    /// Configuration is invalid or incomplete.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// A status transition that the state machine never allows.
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        /// Status the row is expected to hold.
        from: PollingStatus,
        /// Status the update would write.
        to: PollingStatus,
    },
    /// A field name that cannot be written by a conditional update.
    #[error("invalid field `{0}`")]
    InvalidField(String),
    /// The `after_updated` hook failed; the surrounding transaction was rolled back.
    #[error("after-update hook failed: {0:#}")]
    Hook(anyhow::Error),
    /// The controller has been shut down.
    #[error("polling control has been shut down")]
    Shutdown,
    /// Database driver failure.
    #[cfg(feature = "postgres")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
