//! Builders to construct controls and backends from configuration.

pub mod control_builder;

pub use control_builder::{build_lock, build_queue, PollingControlBuilder};
