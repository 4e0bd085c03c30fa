//! Configuration models for controls and their backends.

pub mod control;

pub use control::{ControlConfig, LockBackendConfig, PollingConfig, QueueBackendConfig};
