//! Work queue backends.

pub mod file;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use file::FileQueue;
pub use memory::InMemoryQueue;
#[cfg(feature = "postgres")]
pub use postgres::PostgresQueue;
