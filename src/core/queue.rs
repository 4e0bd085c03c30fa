//! Ordered work queue of entity ids.
//!
//! The backing store is a named list with two ends. Fresh ids are pushed on
//! the left and workers pop from the right, giving FIFO order. A dedup push
//! first removes one existing occurrence of each id; ids that were found are
//! re-inserted on the right ("cutting the line") so overdue retries are not
//! starved by newer work, the rest are appended on the left.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::core::ControlError;

/// Network-visible ordered list store, addressed by queue name.
#[async_trait]
pub trait QueueBackend: Send + Sync + 'static {
    /// Push each id onto the left end, in order (the last id ends up leftmost).
    async fn push_left(&self, queue: &str, ids: &[String]) -> Result<(), ControlError>;

    /// Push each id onto the right end, in order (the last id ends up rightmost).
    async fn push_right(&self, queue: &str, ids: &[String]) -> Result<(), ControlError>;

    /// Pop from the right end; `None` when empty.
    async fn pop_right(&self, queue: &str) -> Result<Option<String>, ControlError>;

    /// Atomically remove the leftmost occurrence of `id`. Returns the removed count (0 or 1).
    async fn remove_one(&self, queue: &str, id: &str) -> Result<u64, ControlError>;

    /// Remove one occurrence of each id; backends that can pipeline should override.
    async fn remove_each(&self, queue: &str, ids: &[String]) -> Result<Vec<u64>, ControlError> {
        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            removed.push(self.remove_one(queue, id).await?);
        }
        Ok(removed)
    }

    /// Current depth.
    async fn size(&self, queue: &str) -> Result<u64, ControlError>;
}

/// Result of a push.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushOutcome {
    /// Ids appended at the push end.
    pub appended: Vec<String>,
    /// Ids that were already queued and moved to the pop end.
    pub cut: Vec<String>,
}

/// A [`QueueBackend`] bound to one queue name.
pub struct WorkQueue<Q: ?Sized> {
    backend: Arc<Q>,
    name: String,
}

impl<Q: ?Sized> Clone for WorkQueue<Q> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            name: self.name.clone(),
        }
    }
}

impl<Q: QueueBackend + ?Sized> WorkQueue<Q> {
    /// Bind `backend` to queue `name`.
    pub fn new(backend: Arc<Q>, name: impl Into<String>) -> Self {
        Self {
            backend,
            name: name.into(),
        }
    }

    /// Queue name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Push ids; with `deduplication` each id holds at most one slot afterwards.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn push(
        &self,
        ids: &[String],
        deduplication: bool,
    ) -> Result<PushOutcome, ControlError> {
        if ids.is_empty() {
            return Ok(PushOutcome::default());
        }
        if !deduplication {
            self.backend.push_left(&self.name, ids).await?;
            return Ok(PushOutcome {
                appended: ids.to_vec(),
                cut: Vec::new(),
            });
        }

        let removed = self.backend.remove_each(&self.name, ids).await?;
        let mut outcome = PushOutcome::default();
        for (id, count) in ids.iter().zip(removed) {
            if count > 0 {
                warn!(queue = %self.name, id = %id, "cutting {id}");
                outcome.cut.push(id.clone());
            } else {
                outcome.appended.push(id.clone());
            }
        }
        if !outcome.cut.is_empty() {
            self.backend.push_right(&self.name, &outcome.cut).await?;
        }
        if !outcome.appended.is_empty() {
            self.backend.push_left(&self.name, &outcome.appended).await?;
        }
        debug!(
            queue = %self.name,
            appended = outcome.appended.len(),
            cut = outcome.cut.len(),
            "dedup push"
        );
        Ok(outcome)
    }

    /// Pop the next id, or `None` when the queue is empty.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn pop(&self) -> Result<Option<String>, ControlError> {
        self.backend.pop_right(&self.name).await
    }

    /// Current depth.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn size(&self) -> Result<u64, ControlError> {
        self.backend.size(&self.name).await
    }
}
