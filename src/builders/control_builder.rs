//! Control builder and backend factories.

use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::config::{ControlConfig, LockBackendConfig, PollingConfig, QueueBackendConfig};
use crate::core::control::{ControlParts, SharedAuditSink};
use crate::core::{
    AuditSink, ControlError, EntityStore, LockService, PollingControl, PollingEntity,
    PollingHandler, QueueBackend,
};
use crate::infra::{FileQueue, InMemoryLockService, InMemoryQueue};
use crate::runtime::TokioSpawner;
use crate::util::{Clock, SystemClock};

/// Assembles a [`PollingControl`].
///
/// Store and handler are required. Queue and lock default to fresh in-memory
/// backends (a process-local lock gives no exclusion across nodes and is
/// logged as a warning), the clock to [`SystemClock`] and the spawner to the current tokio
/// runtime.
///
/// ```rust,ignore
/// let control = PollingControlBuilder::new("orderControl")
///     .config(ControlConfig::default().with_threads(8))
///     .store(store)
///     .queue(queue)
///     .lock(lock)
///     .handler(OrderHandler)
///     .build()?;
/// ```
pub struct PollingControlBuilder<E, S, H> {
    name: String,
    config: ControlConfig,
    store: Option<Arc<S>>,
    queue: Option<Arc<dyn QueueBackend>>,
    lock: Option<Arc<dyn LockService>>,
    handler: Option<Arc<H>>,
    spawner: Option<TokioSpawner>,
    clock: Option<Arc<dyn Clock>>,
    audit: Option<SharedAuditSink>,
    _entity: PhantomData<fn() -> E>,
}

impl<E, S, H> PollingControlBuilder<E, S, H>
where
    E: PollingEntity,
    S: EntityStore<E>,
    H: PollingHandler<E, S::Session>,
{
    /// Start a builder for control `name` with default configuration.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: ControlConfig::default(),
            store: None,
            queue: None,
            lock: None,
            handler: None,
            spawner: None,
            clock: None,
            audit: None,
            _entity: PhantomData,
        }
    }

    /// Start a builder taking the settings for `name` from `config`.
    #[must_use]
    pub fn from_polling_config(name: impl Into<String>, config: &PollingConfig) -> Self {
        let name = name.into();
        let control = config.control(&name);
        Self::new(name).config(control)
    }

    /// Use `config`.
    #[must_use]
    pub fn config(mut self, config: ControlConfig) -> Self {
        self.config = config;
        self
    }

    /// Entity store.
    #[must_use]
    pub fn store(mut self, store: Arc<S>) -> Self {
        self.store = Some(store);
        self
    }

    /// Work queue backend.
    #[must_use]
    pub fn queue<Q: QueueBackend>(mut self, queue: Arc<Q>) -> Self {
        let queue: Arc<dyn QueueBackend> = queue;
        self.queue = Some(queue);
        self
    }

    /// Work queue backend already erased, e.g. from [`build_queue`].
    #[must_use]
    pub fn queue_dyn(mut self, queue: Arc<dyn QueueBackend>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Lock service.
    #[must_use]
    pub fn lock<L: LockService>(mut self, lock: Arc<L>) -> Self {
        let lock: Arc<dyn LockService> = lock;
        self.lock = Some(lock);
        self
    }

    /// Lock service already erased, e.g. from [`build_lock`].
    #[must_use]
    pub fn lock_dyn(mut self, lock: Arc<dyn LockService>) -> Self {
        self.lock = Some(lock);
        self
    }

    /// Work handler.
    #[must_use]
    pub fn handler(mut self, handler: H) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Runtime the drain pool spawns on.
    #[must_use]
    pub fn spawner(mut self, spawner: TokioSpawner) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Time source.
    #[must_use]
    pub fn clock(mut self, clock: impl Clock) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(clock);
        self.clock = Some(clock);
        self
    }

    /// Audit sink receiving every queue and status decision.
    #[must_use]
    pub fn audit(mut self, sink: impl AuditSink + 'static) -> Self {
        let sink: Box<dyn AuditSink> = Box::new(sink);
        self.audit = Some(Arc::new(Mutex::new(sink)));
        self
    }

    /// Build the control.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Config`] when store or handler is missing, the
    /// configuration is invalid, or no spawner was given outside a tokio runtime.
    pub fn build(self) -> Result<PollingControl<E, S, H>, ControlError> {
        let store = self
            .store
            .ok_or_else(|| ControlError::Config("store is required".into()))?;
        let handler = self
            .handler
            .ok_or_else(|| ControlError::Config("handler is required".into()))?;
        let spawner = match self.spawner {
            Some(spawner) => spawner,
            None => TokioSpawner::current()?,
        };
        let queue: Arc<dyn QueueBackend> = match self.queue {
            Some(queue) => queue,
            None => Arc::new(InMemoryQueue::new()),
        };
        let lock: Arc<dyn LockService> = match self.lock {
            Some(lock) => lock,
            None => {
                warn!(
                    control = %self.name,
                    "no lock service configured, scans are only exclusive within this process"
                );
                Arc::new(InMemoryLockService::new())
            }
        };
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };
        PollingControl::from_parts(ControlParts {
            name: self.name,
            config: self.config,
            store,
            queue,
            lock,
            handler,
            spawner,
            clock,
            audit: self.audit,
        })
    }
}

/// Create the queue backend selected by `config`.
///
/// Every call creates a new backend; share the returned handle between
/// controls that should see the same lists.
///
/// # Errors
///
/// Returns backend creation failures, and [`ControlError::Config`] for
/// Postgres without the `postgres` feature.
pub async fn build_queue(config: &QueueBackendConfig) -> Result<Arc<dyn QueueBackend>, ControlError> {
    match config {
        QueueBackendConfig::InMemory => Ok(Arc::new(InMemoryQueue::new())),
        QueueBackendConfig::File { dir } => Ok(Arc::new(FileQueue::open(dir)?)),
        #[cfg(feature = "postgres")]
        QueueBackendConfig::Postgres { url } => {
            let pool = sqlx::PgPool::connect(url).await?;
            let queue = crate::infra::queue::PostgresQueue::new(pool);
            queue.migrate().await?;
            Ok(Arc::new(queue))
        }
        #[cfg(not(feature = "postgres"))]
        QueueBackendConfig::Postgres { .. } => Err(ControlError::Config(
            "postgres queue requires the `postgres` feature".into(),
        )),
    }
}

/// Create the lock service selected by `config`.
///
/// # Errors
///
/// Returns backend creation failures, and [`ControlError::Config`] for
/// Postgres without the `postgres` feature.
pub async fn build_lock(config: &LockBackendConfig) -> Result<Arc<dyn LockService>, ControlError> {
    match config {
        LockBackendConfig::InMemory => Ok(Arc::new(InMemoryLockService::new())),
        #[cfg(feature = "postgres")]
        LockBackendConfig::Postgres { url } => {
            let pool = sqlx::PgPool::connect(url).await?;
            Ok(Arc::new(crate::infra::lock::PostgresLockService::new(pool)))
        }
        #[cfg(not(feature = "postgres"))]
        LockBackendConfig::Postgres { .. } => Err(ControlError::Config(
            "postgres lock requires the `postgres` feature".into(),
        )),
    }
}
