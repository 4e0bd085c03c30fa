//! Entity store backends.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::{InMemoryEntityStore, InMemorySession};
#[cfg(feature = "postgres")]
pub use postgres::PostgresEntityStore;
