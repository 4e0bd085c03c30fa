//! Tokio runtime spawner implementation.

use std::future::Future;
use std::sync::Arc;

use crate::core::{ControlError, Spawn};

/// Tokio-based spawner that executes tasks on a tokio runtime.
#[derive(Clone, Debug)]
pub struct TokioSpawner {
    handle: Arc<tokio::runtime::Handle>,
}

impl TokioSpawner {
    /// Create a new `TokioSpawner` from a tokio runtime handle.
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self {
            handle: Arc::new(handle),
        }
    }

    /// Spawner for the runtime the caller is running on.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Config`] outside a tokio runtime.
    pub fn current() -> Result<Self, ControlError> {
        tokio::runtime::Handle::try_current()
            .map(Self::new)
            .map_err(|e| ControlError::Config(format!("no tokio runtime: {e}")))
    }

    /// Underlying runtime handle.
    #[must_use]
    pub fn handle(&self) -> &tokio::runtime::Handle {
        &self.handle
    }
}

impl Spawn for TokioSpawner {
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(fut);
    }
}
