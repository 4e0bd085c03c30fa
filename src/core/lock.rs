//! Cluster-wide named lock.

use async_trait::async_trait;

use crate::core::ControlError;

/// Non-blocking named lock shared by all nodes of a cluster.
#[async_trait]
pub trait LockService: Send + Sync + 'static {
    /// Try once to take `name`. Never waits.
    async fn try_lock(&self, name: &str) -> Result<bool, ControlError>;

    /// Release `name` if held by this node.
    async fn unlock(&self, name: &str) -> Result<(), ControlError>;
}
