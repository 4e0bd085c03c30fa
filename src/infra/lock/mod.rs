//! Lock service backends.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::InMemoryLockService;
#[cfg(feature = "postgres")]
pub use postgres::PostgresLockService;
