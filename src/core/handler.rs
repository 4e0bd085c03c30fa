//! Pluggable work handler.

use async_trait::async_trait;

use crate::core::entity::{FieldValues, PollingEntity};

/// Business logic run for each dequeued entity.
///
/// `X` is the store's transaction type, handed to [`PollingHandler::after_updated`].
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use prometheus_polling_control::core::{FieldValues, PollingHandler, PollingRecord};
/// use prometheus_polling_control::infra::InMemorySession;
///
/// struct Notify;
///
/// // The second parameter is the store's `Session`; here `InMemoryEntityStore`.
/// #[async_trait]
/// impl PollingHandler<PollingRecord, InMemorySession<PollingRecord>> for Notify {
///     async fn handle(&self, entity: &PollingRecord) -> anyhow::Result<FieldValues> {
///         let mut fields = FieldValues::new();
///         fields.insert("receipt".into(), send(entity).await?.into());
///         Ok(fields)
///     }
/// }
/// ```
#[async_trait]
pub trait PollingHandler<E, X = ()>: Send + Sync + 'static
where
    E: PollingEntity,
    X: Send,
{
    /// Process `entity`; returned fields are written with the `SUCCESSFUL` status.
    async fn handle(&self, entity: &E) -> anyhow::Result<FieldValues>;

    /// Whether `error` deserves another attempt. Defaults to [`is_io_error`].
    fn is_temporary_error(&self, error: &anyhow::Error) -> bool {
        is_io_error(error)
    }

    /// Runs inside the transaction that marked `entity` successful.
    async fn after_updated(&self, _session: &mut X, _entity: &E) -> anyhow::Result<()> {
        Ok(())
    }
}

/// I/O-class failures: the error itself or its direct cause is a [`std::io::Error`].
#[must_use]
pub fn is_io_error(error: &anyhow::Error) -> bool {
    error
        .chain()
        .take(2)
        .any(|cause| cause.is::<std::io::Error>())
}
