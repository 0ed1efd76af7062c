use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::sync::mpsc;

use super::NodeEvent;
use crate::Result;

/// Durable node payload plus the version used for conditional writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeData {
    pub data: Vec<u8>,
    pub version: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    /// Survives the creating session
    Persistent,
    /// Removed by the service when the creating session ends
    Ephemeral,
}

/// Session-scoped handle to a hierarchical coordination service.
///
/// All store-level atomicity routes through the conditional primitives
/// here (`create` refusing existing nodes, version-checked `set_data` and
/// `delete`); implementations must never substitute a local check-then-act
/// pair, since concurrent sessions in different processes are the primary
/// race scenario.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CoordinationClient: Send + Sync + 'static {
    /// Atomic create. Fails with [`crate::CoordinationError::NodeExists`]
    /// when the path is already present.
    async fn create(
        &self,
        path: &str,
        data: &[u8],
        mode: CreateMode,
    ) -> Result<()>;

    /// Fails with [`crate::CoordinationError::NoNode`] when absent.
    async fn get_data(
        &self,
        path: &str,
    ) -> Result<NodeData>;

    /// Conditional write; `expected_version: None` is last-write-wins.
    /// Returns the node's new version.
    async fn set_data(
        &self,
        path: &str,
        data: &[u8],
        expected_version: Option<i64>,
    ) -> Result<i64>;

    async fn check_exists(
        &self,
        path: &str,
    ) -> Result<bool>;

    async fn delete(
        &self,
        path: &str,
        expected_version: Option<i64>,
    ) -> Result<()>;

    /// Persistent subscription to changes of `path`'s direct children.
    ///
    /// The adapter re-arms any one-shot watch primitive of the underlying
    /// service; the receiver stays live until the session is lost or the
    /// receiver is dropped. Delivery is serialized per subscription.
    async fn watch_children(
        &self,
        path: &str,
    ) -> Result<mpsc::UnboundedReceiver<NodeEvent>>;

    /// Creates `path` and any missing parents, tolerating concurrent
    /// creators racing on the same levels.
    async fn ensure_path(
        &self,
        path: &str,
    ) -> Result<()>;
}
