//! Tick loops driving registered controls.
//!
//! Each control gets two tasks: the enqueue tick runs at a fixed rate (missed
//! ticks are skipped, not bunched) and the dequeue tick runs with a fixed delay
//! between invocations. Both stop when the runtime's shutdown signal flips.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::core::{ControlError, EntityStore, PollingControl, PollingEntity, PollingHandler};

/// Something with an enqueue tick and a dequeue tick.
#[async_trait]
pub trait Pollable: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Period of the enqueue tick.
    fn enqueue_rate(&self) -> Duration;

    /// Pause after each dequeue tick.
    fn dequeue_delay(&self) -> Duration;

    /// Enqueue tick.
    fn enqueue(&self) -> bool;

    /// Dequeue tick.
    fn dequeue(&self) -> usize;

    /// Stop accepting ticks.
    fn shutdown(&self);

    /// Wait for in-flight work.
    async fn wait_idle(&self, timeout: Duration) -> bool;
}

#[async_trait]
impl<E, S, H> Pollable for PollingControl<E, S, H>
where
    E: PollingEntity,
    S: EntityStore<E>,
    H: PollingHandler<E, S::Session>,
{
    fn name(&self) -> &str {
        Self::name(self)
    }

    fn enqueue_rate(&self) -> Duration {
        self.config().enqueue_rate()
    }

    fn dequeue_delay(&self) -> Duration {
        self.config().dequeue_delay()
    }

    fn enqueue(&self) -> bool {
        Self::enqueue(self)
    }

    fn dequeue(&self) -> usize {
        Self::dequeue(self)
    }

    fn shutdown(&self) {
        Self::shutdown(self);
    }

    async fn wait_idle(&self, timeout: Duration) -> bool {
        Self::wait_idle(self, timeout).await
    }
}

/// Owns the tick loops of a set of controls.
pub struct PollingRuntime {
    controls: Vec<Arc<dyn Pollable>>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Default for PollingRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl PollingRuntime {
    /// Create an empty runtime.
    #[must_use]
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            controls: Vec::new(),
            shutdown_tx,
            tasks: Vec::new(),
        }
    }

    /// Register a control; it starts ticking on [`PollingRuntime::start`].
    pub fn register(&mut self, control: impl Pollable) -> &mut Self {
        self.controls.push(Arc::new(control));
        self
    }

    /// Number of registered controls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.controls.len()
    }

    /// Whether no control is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }

    /// Whether the tick loops are running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// Spawn the tick loops on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Config`] outside a tokio runtime, and
    /// [`ControlError::Shutdown`] when already started or shut down.
    pub fn start(&mut self) -> Result<(), ControlError> {
        if self.is_running() || *self.shutdown_tx.borrow() {
            return Err(ControlError::Shutdown);
        }
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| ControlError::Config(format!("no tokio runtime: {e}")))?;
        for control in &self.controls {
            self.tasks.push(handle.spawn(enqueue_loop(
                Arc::clone(control),
                self.shutdown_tx.subscribe(),
            )));
            self.tasks.push(handle.spawn(dequeue_loop(
                Arc::clone(control),
                self.shutdown_tx.subscribe(),
            )));
        }
        info!(controls = self.controls.len(), "polling runtime started");
        Ok(())
    }

    /// Stop the tick loops, shut every control down and wait up to `timeout`
    /// for in-flight work. Returns whether everything finished in time.
    pub async fn shutdown(&mut self, timeout: Duration) -> bool {
        self.shutdown_tx.send_replace(true);
        for task in self.tasks.drain(..) {
            if let Err(err) = task.await {
                warn!(error = %err, "tick loop ended abnormally");
            }
        }
        for control in &self.controls {
            control.shutdown();
        }
        let mut idle = true;
        for control in &self.controls {
            if !control.wait_idle(timeout).await {
                warn!(control = %control.name(), "in-flight work still running after shutdown timeout");
                idle = false;
            }
        }
        info!(idle, "polling runtime stopped");
        idle
    }
}

async fn enqueue_loop(control: Arc<dyn Pollable>, mut shutdown_rx: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(control.enqueue_rate());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        tokio::select! {
            _ = interval.tick() => {
                if !control.enqueue() {
                    debug!(control = %control.name(), "enqueue tick skipped");
                }
            }
            _ = shutdown_rx.changed() => break,
        }
    }
    debug!(control = %control.name(), "enqueue loop stopped");
}

async fn dequeue_loop(control: Arc<dyn Pollable>, mut shutdown_rx: watch::Receiver<bool>) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        let started = control.dequeue();
        if started > 0 {
            debug!(control = %control.name(), started, "drains started");
        }
        tokio::select! {
            () = tokio::time::sleep(control.dequeue_delay()) => {}
            _ = shutdown_rx.changed() => break,
        }
    }
    debug!(control = %control.name(), "dequeue loop stopped");
}
