//! Process-local lock registry.
//!
//! One registry stands in for a cluster: every handle created with
//! [`InMemoryLockService::node`] acts as a separate node with its own owner
//! token, so tests can exercise contention between "nodes" in one process.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::core::{ControlError, LockService};

/// Named non-reentrant locks shared by all nodes of one registry.
#[derive(Debug)]
pub struct InMemoryLockService {
    registry: Arc<Mutex<HashMap<String, Uuid>>>,
    owner: Uuid,
}

impl Default for InMemoryLockService {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLockService {
    /// Create a registry and its first node.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(HashMap::new())),
            owner: Uuid::new_v4(),
        }
    }

    /// Another node sharing this registry.
    #[must_use]
    pub fn node(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            owner: Uuid::new_v4(),
        }
    }

    /// Whether any node holds `name`.
    #[must_use]
    pub fn is_locked(&self, name: &str) -> bool {
        self.registry.lock().contains_key(name)
    }
}

#[async_trait]
impl LockService for InMemoryLockService {
    async fn try_lock(&self, name: &str) -> Result<bool, ControlError> {
        let mut registry = self.registry.lock();
        if registry.contains_key(name) {
            return Ok(false);
        }
        registry.insert(name.to_owned(), self.owner);
        Ok(true)
    }

    async fn unlock(&self, name: &str) -> Result<(), ControlError> {
        let mut registry = self.registry.lock();
        match registry.get(name) {
            Some(owner) if *owner == self.owner => {
                registry.remove(name);
            }
            Some(_) => warn!(lock = %name, "unlock ignored, held by another node"),
            None => warn!(lock = %name, "unlock ignored, not held"),
        }
        Ok(())
    }
}
