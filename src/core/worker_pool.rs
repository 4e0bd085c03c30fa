//! Drain pool: a fixed number of queue-draining tasks plus one reserved
//! scheduler slot.
//!
//! The pool does not own threads itself; it hands futures to a [`Spawn`]
//! implementation (normally a multi-threaded Tokio runtime, see
//! [`crate::runtime::TokioSpawner`]) and bounds how many of them run at once.
//! The scheduler slot is tracked separately so a saturated set of drains never
//! keeps a scan from starting.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, info};

/// Abstraction for spawning task execution on a runtime.
pub trait Spawn {
    /// Spawn an async task that returns a future.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Errors that can occur when using a `DrainPool`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// All drain slots are taken.
    Saturated,

    /// The pool has been shut down.
    PoolShutdown,

    /// Configuration validation failed.
    InvalidConfig(String),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Saturated => write!(f, "all drain slots are busy"),
            Self::PoolShutdown => write!(f, "pool has been shut down"),
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for PoolError {}

/// Releases a drain slot when the drain future completes or unwinds.
struct DrainSlot {
    active: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl Drop for DrainSlot {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
        self.idle.notify_waiters();
    }
}

/// Releases the scheduler slot.
struct SchedulerSlot {
    busy: Arc<AtomicBool>,
    idle: Arc<Notify>,
}

impl Drop for SchedulerSlot {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
        self.idle.notify_waiters();
    }
}

/// Bounded set of drain tasks with a reserved scheduler slot.
pub struct DrainPool<S> {
    threads: usize,
    spawner: S,
    active: Arc<AtomicUsize>,
    scheduling: Arc<AtomicBool>,
    shutdown: AtomicBool,
    idle: Arc<Notify>,
}

impl<S: Spawn> DrainPool<S> {
    /// Create a pool allowing `threads` concurrent drains.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidConfig` when `threads` is zero.
    pub fn new(threads: usize, spawner: S) -> Result<Self, PoolError> {
        if threads == 0 {
            return Err(PoolError::InvalidConfig(
                "threads must be greater than 0".into(),
            ));
        }
        info!(threads, "drain pool initialized with {} slots", threads + 1);
        Ok(Self {
            threads,
            spawner,
            active: Arc::new(AtomicUsize::new(0)),
            scheduling: Arc::new(AtomicBool::new(false)),
            shutdown: AtomicBool::new(false),
            idle: Arc::new(Notify::new()),
        })
    }

    /// Configured number of drain slots.
    #[must_use]
    pub const fn threads(&self) -> usize {
        self.threads
    }

    /// Drains currently running.
    #[must_use]
    pub fn active_drains(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Whether a scheduler invocation holds the reserved slot.
    #[must_use]
    pub fn is_scheduling(&self) -> bool {
        self.scheduling.load(Ordering::Acquire)
    }

    /// Free drain slots.
    #[must_use]
    pub fn vacancies(&self) -> usize {
        self.threads.saturating_sub(self.active_drains())
    }

    /// Run `fut` in a drain slot.
    ///
    /// # Errors
    ///
    /// - `PoolError::PoolShutdown` after [`DrainPool::shutdown`]
    /// - `PoolError::Saturated` when every drain slot is taken
    pub fn execute_drain<F>(&self, fut: F) -> Result<(), PoolError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_shutdown() {
            return Err(PoolError::PoolShutdown);
        }
        let mut current = self.active.load(Ordering::Acquire);
        loop {
            if current >= self.threads {
                return Err(PoolError::Saturated);
            }
            match self.active.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        let slot = DrainSlot {
            active: Arc::clone(&self.active),
            idle: Arc::clone(&self.idle),
        };
        self.spawner.spawn(async move {
            let _slot = slot;
            fut.await;
        });
        Ok(())
    }

    /// Run `fut` in the scheduler slot. Returns `false` if the slot is busy.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::PoolShutdown` after [`DrainPool::shutdown`].
    pub fn execute_scheduler<F>(&self, fut: F) -> Result<bool, PoolError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_shutdown() {
            return Err(PoolError::PoolShutdown);
        }
        if self
            .scheduling
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("scheduler slot busy, skipping");
            return Ok(false);
        }
        let slot = SchedulerSlot {
            busy: Arc::clone(&self.scheduling),
            idle: Arc::clone(&self.idle),
        };
        self.spawner.spawn(async move {
            let _slot = slot;
            fut.await;
        });
        Ok(true)
    }

    /// Stop accepting work. Running futures finish on their own. Returns
    /// `false` if the pool was already shut down.
    pub fn shutdown(&self) -> bool {
        !self.shutdown.swap(true, Ordering::AcqRel)
    }

    /// Whether [`DrainPool::shutdown`] was called.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Whether no drain and no scheduler invocation is running.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.active_drains() == 0 && !self.is_scheduling()
    }

    /// Wait until the pool is idle or `timeout` elapses. Returns whether it is idle.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_idle() {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.is_idle();
            }
        }
    }
}
