//! # Prometheus Polling Control
//!
//! A polling-based task control engine: turns a persisted collection of
//! "pending work" entities into reliably processed work items.
//!
//! Each control combines:
//!
//! - an **entity store** holding a status state machine
//!   (`INITIALIZED -> PROCESSING -> SUCCESSFUL | TEMPORARY_ERROR | FAILED`),
//!   mutated only through compare-and-swap updates keyed on `(id, expected status)`;
//! - an ordered **work queue** of entity ids in a shared list store;
//! - a cluster-wide **lock** that keeps the store scan single-writer;
//! - a local **drain pool** running the pluggable handler.
//!
//! ## Guarantees
//!
//! - **Persist before publish**: an id is only queued once its entity is durably
//!   `PROCESSING`, so a crash-recovery scan can always rediscover lost work.
//! - **At-least-once**: duplicate deliveries are harmless; of several workers
//!   racing on one entity exactly one records the outcome, the others log a
//!   lost race and change nothing.
//! - **Bounded retries**: retryable failures back off by `interval_factor * attempt`
//!   and entities end `FAILED` once `max_attempts` is reached.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use prometheus_polling_control::builders::PollingControlBuilder;
//! use prometheus_polling_control::config::ControlConfig;
//! use prometheus_polling_control::infra::{InMemoryEntityStore, InMemoryLockService, InMemoryQueue};
//! use prometheus_polling_control::core::{FieldValues, PollingHandler, PollingRecord};
//! use prometheus_polling_control::infra::InMemorySession;
//! use prometheus_polling_control::runtime::PollingRuntime;
//!
//! struct SendNotification;
//!
//! #[async_trait::async_trait]
//! impl PollingHandler<PollingRecord, InMemorySession<PollingRecord>> for SendNotification {
//!     async fn handle(&self, entity: &PollingRecord) -> anyhow::Result<FieldValues> {
//!         let mut fields = FieldValues::new();
//!         fields.insert("receipt".into(), notify(&entity.payload).await?.into());
//!         Ok(fields)
//!     }
//! }
//!
//! let control = PollingControlBuilder::new("notificationControl")
//!     .config(ControlConfig::from_env("NOTIFICATION")?)
//!     .store(Arc::new(InMemoryEntityStore::<PollingRecord>::new()))
//!     .queue(Arc::new(InMemoryQueue::new()))
//!     .lock(Arc::new(InMemoryLockService::new()))
//!     .handler(SendNotification)
//!     .build()?;
//!
//! let mut runtime = PollingRuntime::new();
//! runtime.register(control);
//! runtime.start()?;
//! // ...
//! runtime.shutdown(std::time::Duration::from_secs(30)).await;
//! ```
//!
//! Postgres-backed store, queue and lock adapters are available with the
//! `postgres` feature.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core polling abstractions: entity model, backend seams, scheduler and workers.
pub mod core;
/// Configuration models for controls and backends.
pub mod config;
/// Builders to construct controls and backends from configuration.
pub mod builders;
/// Infrastructure adapters for stores, queues, and locks.
pub mod infra;
/// Runtime adapters: tokio spawner and tick loops.
pub mod runtime;
/// Shared utilities.
pub mod util;
