//! In-memory list store with Redis list semantics.
//!
//! The left end is the front of each `VecDeque`. One instance can be shared by
//! many controls (and cloned handles) to stand in for a network list store.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::{ControlError, QueueBackend};

/// Shared in-memory named lists. Clones share the same lists.
#[derive(Debug, Clone, Default)]
pub struct InMemoryQueue {
    lists: Arc<Mutex<HashMap<String, VecDeque<String>>>>,
}

impl InMemoryQueue {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Contents of `queue` from the left (push) end to the right (pop) end.
    #[must_use]
    pub fn snapshot(&self, queue: &str) -> Vec<String> {
        self.lists
            .lock()
            .get(queue)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn remove_leftmost(list: &mut VecDeque<String>, id: &str) -> u64 {
        match list.iter().position(|queued| queued == id) {
            Some(index) => {
                list.remove(index);
                1
            }
            None => 0,
        }
    }
}

#[async_trait]
impl QueueBackend for InMemoryQueue {
    async fn push_left(&self, queue: &str, ids: &[String]) -> Result<(), ControlError> {
        let mut lists = self.lists.lock();
        let list = lists.entry(queue.to_owned()).or_default();
        for id in ids {
            list.push_front(id.clone());
        }
        Ok(())
    }

    async fn push_right(&self, queue: &str, ids: &[String]) -> Result<(), ControlError> {
        let mut lists = self.lists.lock();
        let list = lists.entry(queue.to_owned()).or_default();
        list.extend(ids.iter().cloned());
        Ok(())
    }

    async fn pop_right(&self, queue: &str) -> Result<Option<String>, ControlError> {
        Ok(self
            .lists
            .lock()
            .get_mut(queue)
            .and_then(VecDeque::pop_back))
    }

    async fn remove_one(&self, queue: &str, id: &str) -> Result<u64, ControlError> {
        Ok(self
            .lists
            .lock()
            .get_mut(queue)
            .map_or(0, |list| Self::remove_leftmost(list, id)))
    }

    async fn remove_each(&self, queue: &str, ids: &[String]) -> Result<Vec<u64>, ControlError> {
        let mut lists = self.lists.lock();
        let Some(list) = lists.get_mut(queue) else {
            return Ok(vec![0; ids.len()]);
        };
        Ok(ids
            .iter()
            .map(|id| Self::remove_leftmost(list, id))
            .collect())
    }

    async fn size(&self, queue: &str) -> Result<u64, ControlError> {
        Ok(self
            .lists
            .lock()
            .get(queue)
            .map_or(0, |list| list.len() as u64))
    }
}
