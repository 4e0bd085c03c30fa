//! Polling control: wires store, queue, lock, handler and drain pool together.
//!
//! A control is driven by two periodic ticks (see [`crate::runtime::PollingRuntime`]):
//!
//! - [`PollingControl::enqueue`] dispatches one scheduler scan onto the reserved
//!   pool slot. The scan runs under the distributed lock `"<name>.enqueue()"` and
//!   is skipped when another node holds it.
//! - [`PollingControl::dequeue`] tops the pool up to `threads` drain tasks, each
//!   popping ids until the queue is empty.
//!
//! The scan passes live in [`crate::core::scheduler`], the drain loop in
//! [`crate::core::worker`].

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::ControlConfig;
use crate::core::audit::{build_audit_event, AuditAction, AuditSink};
use crate::core::entity::PollingEntity;
use crate::core::handler::PollingHandler;
use crate::core::lock::LockService;
use crate::core::queue::{QueueBackend, WorkQueue};
use crate::core::scheduler::EnqueueReport;
use crate::core::stats::{ControlCounters, ControlStats};
use crate::core::store::EntityStore;
use crate::core::worker_pool::DrainPool;
use crate::core::ControlError;
use crate::runtime::TokioSpawner;
use crate::util::Clock;

/// Shared audit sink handle.
pub type SharedAuditSink = Arc<Mutex<Box<dyn AuditSink>>>;

/// Everything a control is assembled from; see [`crate::builders::PollingControlBuilder`].
pub(crate) struct ControlParts<S, H> {
    pub name: String,
    pub config: ControlConfig,
    pub store: Arc<S>,
    pub queue: Arc<dyn QueueBackend>,
    pub lock: Arc<dyn LockService>,
    pub handler: Arc<H>,
    pub spawner: TokioSpawner,
    pub clock: Arc<dyn Clock>,
    pub audit: Option<SharedAuditSink>,
}

pub(crate) struct ControlInner<E, S, H> {
    pub(crate) name: String,
    pub(crate) config: ControlConfig,
    pub(crate) store: Arc<S>,
    pub(crate) queue: WorkQueue<dyn QueueBackend>,
    pub(crate) lock: Arc<dyn LockService>,
    pub(crate) handler: Arc<H>,
    pub(crate) pool: DrainPool<TokioSpawner>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) audit: Option<SharedAuditSink>,
    pub(crate) counters: ControlCounters,
    pub(crate) enqueue_lock: String,
    _entity: PhantomData<fn() -> E>,
}

/// Polling-based task control for entities of type `E`.
///
/// Cheap to clone; clones share the pool, counters and backends.
pub struct PollingControl<E, S, H> {
    pub(crate) inner: Arc<ControlInner<E, S, H>>,
}

impl<E, S, H> Clone for PollingControl<E, S, H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E, S, H> PollingControl<E, S, H>
where
    E: PollingEntity,
    S: EntityStore<E>,
    H: PollingHandler<E, S::Session>,
{
    pub(crate) fn from_parts(parts: ControlParts<S, H>) -> Result<Self, ControlError> {
        parts.config.validate().map_err(ControlError::Config)?;
        let pool = DrainPool::new(parts.config.threads, parts.spawner)
            .map_err(|e| ControlError::Config(e.to_string()))?;
        let queue_name = parts
            .config
            .queue_name
            .clone()
            .unwrap_or_else(|| E::entity_name().to_owned());
        let enqueue_lock = format!("{}.enqueue()", parts.name);
        info!(
            control = %parts.name,
            queue = %queue_name,
            threads = parts.config.threads,
            max_attempts = parts.config.max_attempts,
            "polling control initialized"
        );
        Ok(Self {
            inner: Arc::new(ControlInner {
                name: parts.name,
                queue: WorkQueue::new(parts.queue, queue_name),
                config: parts.config,
                store: parts.store,
                lock: parts.lock,
                handler: parts.handler,
                pool,
                clock: parts.clock,
                audit: parts.audit,
                counters: ControlCounters::default(),
                enqueue_lock,
                _entity: PhantomData,
            }),
        })
    }

    /// Control name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Effective configuration.
    #[must_use]
    pub fn config(&self) -> &ControlConfig {
        &self.inner.config
    }

    /// Name of the work queue.
    #[must_use]
    pub fn queue_name(&self) -> &str {
        self.inner.queue.name()
    }

    /// Name of the cluster-wide lock guarding scans.
    #[must_use]
    pub fn enqueue_lock_name(&self) -> &str {
        &self.inner.enqueue_lock
    }

    /// Enqueue tick: run one scan on the reserved slot.
    ///
    /// Returns `false` when the control is shut down or a scan is already
    /// running locally.
    pub fn enqueue(&self) -> bool {
        if self.is_shutdown() {
            return false;
        }
        let this = self.clone();
        let started = self.inner.pool.execute_scheduler(async move {
            if let Err(err) = this.run_enqueue().await {
                error!(control = %this.name(), error = %err, "enqueue failed");
            }
        });
        started.unwrap_or(false)
    }

    /// Run one scan in the calling task, under the distributed lock.
    ///
    /// Returns `None` when the lock is held elsewhere or the control is shut down.
    ///
    /// # Errors
    ///
    /// Propagates lock, store and queue failures; the lock is released either way.
    pub async fn run_enqueue(&self) -> Result<Option<EnqueueReport>, ControlError> {
        if self.is_shutdown() {
            return Ok(None);
        }
        let lock_name = &self.inner.enqueue_lock;
        if !self.inner.lock.try_lock(lock_name).await? {
            debug!(control = %self.name(), lock = %lock_name, "enqueue lock held elsewhere, skipping");
            return Ok(None);
        }
        let result = self.do_enqueue().await;
        if let Err(err) = self.inner.lock.unlock(lock_name).await {
            warn!(control = %self.name(), lock = %lock_name, error = %err, "failed to release enqueue lock");
        }
        result.map(Some)
    }

    /// Dequeue tick: start `threads - active` drain tasks. Returns how many started.
    pub fn dequeue(&self) -> usize {
        if self.is_shutdown() {
            return 0;
        }
        let vacancies = self.inner.pool.vacancies();
        let mut started = 0;
        for _ in 0..vacancies {
            let this = self.clone();
            let spawned = self.inner.pool.execute_drain(async move {
                match this.do_dequeue().await {
                    Ok(report) if report.popped > 0 => {
                        debug!(control = %this.name(), ?report, "drain finished");
                    }
                    Ok(_) => {}
                    Err(err) => error!(control = %this.name(), error = %err, "drain failed"),
                }
            });
            if spawned.is_err() {
                break;
            }
            started += 1;
        }
        started
    }

    /// Current work queue depth.
    ///
    /// # Errors
    ///
    /// Propagates queue backend failures.
    pub async fn queue_depth(&self) -> Result<u64, ControlError> {
        self.inner.queue.size().await
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> ControlStats {
        self.inner
            .counters
            .snapshot(self.inner.pool.active_drains())
    }

    /// Stop accepting ticks. Running drains stop at their next pop.
    pub fn shutdown(&self) {
        if self.inner.pool.shutdown() {
            info!(control = %self.name(), "polling control shutting down");
        }
    }

    /// Whether [`PollingControl::shutdown`] was called.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.pool.is_shutdown()
    }

    /// Wait for running scans and drains to finish. Returns whether they did within `timeout`.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        self.inner.pool.wait_idle(timeout).await
    }

    pub(crate) fn audit(&self, entity_id: &str, action: AuditAction, detail: Option<String>) {
        if let Some(sink) = &self.inner.audit {
            sink.lock()
                .record(build_audit_event(&self.inner.name, entity_id, action, detail));
        }
    }
}
