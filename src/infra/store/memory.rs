//! In-memory entity store.
//!
//! Rows live behind one async `RwLock`; every operation that writes holds the
//! write guard for its whole duration, which makes it a serializable
//! transaction. Update hooks run under the same guard and may stage extra rows
//! through [`InMemorySession`], applied only when the hook succeeds.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::core::{
    BatchCallback, BatchMutator, ConditionalUpdate, ControlError, Criteria, EntityStore,
    PollingEntity, UpdateHook,
};

/// Transaction handle handed to update hooks.
#[derive(Debug)]
pub struct InMemorySession<E> {
    staged: Vec<E>,
}

impl<E> InMemorySession<E> {
    /// Write `entity` when the surrounding update commits.
    pub fn stage(&mut self, entity: E) {
        self.staged.push(entity);
    }

    /// Entities staged so far.
    #[must_use]
    pub fn staged(&self) -> &[E] {
        &self.staged
    }
}

/// Entity store kept in process memory.
#[derive(Debug)]
pub struct InMemoryEntityStore<E> {
    rows: RwLock<HashMap<String, E>>,
}

impl<E> Default for InMemoryEntityStore<E> {
    fn default() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }
}

impl<E: PollingEntity> InMemoryEntityStore<E> {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `entity`.
    pub async fn insert(&self, entity: E) {
        self.rows
            .write()
            .await
            .insert(entity.id().to_owned(), entity);
    }

    /// Insert or replace every entity.
    pub async fn insert_all(&self, entities: impl IntoIterator<Item = E> + Send) {
        let mut rows = self.rows.write().await;
        for entity in entities {
            rows.insert(entity.id().to_owned(), entity);
        }
    }

    /// Remove `id`, returning the entity if it existed.
    pub async fn remove(&self, id: &str) -> Option<E> {
        self.rows.write().await.remove(id)
    }

    /// All entities in `create_date, id` order.
    pub async fn snapshot(&self) -> Vec<E> {
        let rows = self.rows.read().await;
        let mut all: Vec<E> = rows.values().cloned().collect();
        all.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
        all
    }

    /// Number of stored entities.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

fn sort_key<E: PollingEntity>(entity: &E) -> (DateTime<Utc>, &str) {
    (entity.create_date(), entity.id())
}

#[async_trait]
impl<E: PollingEntity> EntityStore<E> for InMemoryEntityStore<E> {
    type Session = InMemorySession<E>;

    async fn get(&self, id: &str) -> Result<Option<E>, ControlError> {
        Ok(self.rows.read().await.get(id).cloned())
    }

    async fn iterate(
        &self,
        criteria: &Criteria,
        batch_size: usize,
        mutator: Option<&BatchMutator<E>>,
        callback: &mut (dyn BatchCallback<E> + '_),
    ) -> Result<usize, ControlError> {
        if batch_size == 0 {
            return Err(ControlError::Config("batch_size must be greater than 0".into()));
        }
        let mut after: Option<(DateTime<Utc>, String)> = None;
        let mut total = 0;
        loop {
            let batch = {
                let mut rows = self.rows.write().await;
                let mut page: Vec<E> = rows
                    .values()
                    .filter(|e| criteria.matches(*e))
                    .filter(|e| {
                        after
                            .as_ref()
                            .is_none_or(|(date, id)| sort_key(*e) > (*date, id.as_str()))
                    })
                    .cloned()
                    .collect();
                page.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
                page.truncate(batch_size);
                if let Some(mutate) = mutator {
                    for entity in &mut page {
                        mutate(entity);
                        rows.insert(entity.id().to_owned(), entity.clone());
                    }
                }
                page
            };
            let Some(last) = batch.last() else {
                break;
            };
            after = Some((last.create_date(), last.id().to_owned()));
            total += batch.len();
            callback.on_batch(&batch).await?;
            if batch.len() < batch_size {
                break;
            }
        }
        Ok(total)
    }

    async fn execute_update(
        &self,
        update: &ConditionalUpdate,
        hook: Option<&(dyn UpdateHook<Self::Session> + '_)>,
    ) -> Result<u64, ControlError> {
        let mut rows = self.rows.write().await;
        let Some(current) = rows.get(update.id()) else {
            return Ok(0);
        };
        let mut updated = current.clone();
        if !update.apply_to(&mut updated)? {
            return Ok(0);
        }
        if let Some(hook) = hook {
            let mut session = InMemorySession { staged: Vec::new() };
            hook.run(&mut session).await.map_err(ControlError::Hook)?;
            for staged in session.staged {
                rows.insert(staged.id().to_owned(), staged);
            }
        }
        rows.insert(updated.id().to_owned(), updated);
        Ok(1)
    }
}
