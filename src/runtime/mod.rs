//! Runtime adapters: the tokio spawner and the tick loops driving controls.

pub mod ticker;
pub mod tokio_spawner;

pub use ticker::{Pollable, PollingRuntime};
pub use tokio_spawner::TokioSpawner;
