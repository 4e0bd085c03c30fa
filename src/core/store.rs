//! Entity store abstraction.

use async_trait::async_trait;

use crate::core::criteria::Criteria;
use crate::core::entity::PollingEntity;
use crate::core::update::ConditionalUpdate;
use crate::core::ControlError;

/// Mutation applied to every entity of a batch inside the batch transaction.
pub type BatchMutator<E> = dyn Fn(&mut E) + Send + Sync;

/// Receives each batch after its transaction committed.
#[async_trait]
pub trait BatchCallback<E>: Send {
    /// Handle one committed batch, in store order.
    async fn on_batch(&mut self, batch: &[E]) -> Result<(), ControlError>;
}

/// Side effect run inside the transaction of a successful conditional update.
#[async_trait]
pub trait UpdateHook<X: Send>: Send + Sync {
    /// Run with the open transaction. An error rolls the update back.
    async fn run(&self, session: &mut X) -> anyhow::Result<()>;
}

/// Persistence of polled entities.
///
/// Implementations must make [`EntityStore::execute_update`] atomic per row:
/// of several concurrent updates with the same `(id, expected_status)` exactly
/// one affects the row.
#[async_trait]
pub trait EntityStore<E: PollingEntity>: Send + Sync + 'static {
    /// Transaction handle passed to update hooks.
    type Session: Send;

    /// Load one entity.
    async fn get(&self, id: &str) -> Result<Option<E>, ControlError>;

    /// Walk all entities matching `criteria` in `create_date` order, `batch_size` at a time.
    ///
    /// When `mutator` is given it is applied to each entity of a batch and the
    /// changed polling columns are committed before `callback` sees the batch.
    /// Entities that stopped matching while the batch was locked are skipped.
    /// Returns the number of entities handed to `callback`.
    async fn iterate(
        &self,
        criteria: &Criteria,
        batch_size: usize,
        mutator: Option<&BatchMutator<E>>,
        callback: &mut (dyn BatchCallback<E> + '_),
    ) -> Result<usize, ControlError>;

    /// Apply a conditional update; returns affected rows (0 or 1).
    ///
    /// When the row was updated and `hook` is given, the hook runs in the same
    /// transaction; a hook error rolls back and surfaces as [`ControlError::Hook`].
    async fn execute_update(
        &self,
        update: &ConditionalUpdate,
        hook: Option<&(dyn UpdateHook<Self::Session> + '_)>,
    ) -> Result<u64, ControlError>;
}
