//! Core polling abstractions: entity model, backend seams, scheduler and workers.

pub mod audit;
pub mod control;
pub mod criteria;
pub mod entity;
pub mod error;
pub mod handler;
pub mod lock;
pub mod queue;
pub mod scheduler;
pub mod stats;
pub mod store;
pub mod update;
pub mod worker;
pub mod worker_pool;

pub use audit::{build_audit_event, AuditAction, AuditEvent, AuditSink, InMemoryAuditSink};
pub use control::{PollingControl, SharedAuditSink};
pub use criteria::{AttemptsFilter, Criteria};
pub use entity::{FieldValues, PollingEntity, PollingRecord, PollingStatus};
pub use error::{AppResult, ControlError};
pub use handler::{is_io_error, PollingHandler};
pub use lock::LockService;
pub use queue::{PushOutcome, QueueBackend, WorkQueue};
pub use scheduler::EnqueueReport;
pub use stats::ControlStats;
pub use store::{BatchCallback, BatchMutator, EntityStore, UpdateHook};
pub use update::{ConditionalUpdate, SqlParam, SqlStatement, MAX_ERROR_INFO_CHARS};
pub use worker::{DrainReport, Outcome, MAX_ATTEMPTS_REACHED};
pub use worker_pool::{DrainPool, PoolError, Spawn};
