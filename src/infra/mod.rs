//! Infrastructure adapters for stores, queues, and locks.

pub mod lock;
pub mod queue;
pub mod store;

pub use lock::InMemoryLockService;
pub use queue::{FileQueue, InMemoryQueue};
pub use store::{InMemoryEntityStore, InMemorySession};
