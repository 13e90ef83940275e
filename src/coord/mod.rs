//! Coordination-service facade
//!
//! The name server keeps all durable truth in a hierarchical, watchable
//! key-value store (leader lock, table catalog, id counters, op bookkeeping).
//! [`CoordClient`] abstracts the capabilities it needs: plain and ephemeral
//! nodes, child listings, child watches, and a session that can be lost and
//! re-established. Watches are delivered as a stream of children snapshots
//! over a channel; the facade re-arms itself internally, and the channel
//! closes when the session that registered it dies.

pub mod lock;
pub mod memory;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::common::Result;

pub use lock::{spawn_lock, LockListener};
pub use memory::{MemoryCoordClient, MemoryCoordination};

/// Node creation mode. Ephemeral nodes are tied to the creating session and
/// disappear when it does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    Persistent,
    Ephemeral,
}

/// A session with the coordination service.
///
/// All paths are absolute, `/`-separated. Intermediate path components are
/// implicit; creating `/a/b/c` does not require `/a/b` to exist.
#[async_trait]
pub trait CoordClient: Send + Sync {
    /// Create a node. Fails with [`crate::Error::NodeExists`] if the path is
    /// taken and [`crate::Error::SessionLost`] if the session is down.
    async fn create(&self, path: &str, value: &[u8], mode: CreateMode) -> Result<()>;

    /// Read a node's value. Fails with [`crate::Error::NodeNotFound`].
    async fn get(&self, path: &str) -> Result<Vec<u8>>;

    /// Overwrite an existing node's value. Fails with
    /// [`crate::Error::NodeNotFound`] if the node does not exist.
    async fn set(&self, path: &str, value: &[u8]) -> Result<()>;

    /// Delete a node.
    async fn delete(&self, path: &str) -> Result<()>;

    /// List the direct children of a path, atomically w.r.t. the call.
    async fn list_children(&self, path: &str) -> Result<Vec<String>>;

    /// Watch the children of a path. The current snapshot is delivered
    /// immediately, then one snapshot per membership change. The channel
    /// closes when this session is lost; after [`CoordClient::reconnect`]
    /// the caller must watch again.
    async fn watch_children(&self, path: &str) -> Result<mpsc::UnboundedReceiver<Vec<String>>>;

    /// Session liveness.
    fn is_connected(&self) -> bool;

    /// Identifier of the current session; changes on every reconnect.
    fn session_id(&self) -> u64;

    /// Establish a new session. Ephemeral nodes and watches of the previous
    /// session are gone once this returns.
    async fn reconnect(&self) -> Result<()>;
}

/// Layout of the durable tree under a cluster root.
#[derive(Debug, Clone)]
pub struct CoordPaths {
    root: String,
}

impl CoordPaths {
    pub fn new(root: &str) -> Self {
        Self {
            root: root.trim_end_matches('/').to_string(),
        }
    }

    /// Directory the leader lock is contended in.
    pub fn leader_dir(&self) -> String {
        format!("{}/leader", self.root)
    }

    /// The ephemeral lock node itself.
    pub fn leader_node(&self) -> String {
        format!("{}/leader/lock", self.root)
    }

    /// Directory of table catalog entries, one child per table name.
    pub fn table_dir(&self) -> String {
        format!("{}/table", self.root)
    }

    pub fn table_node(&self, name: &str) -> String {
        format!("{}/table/{}", self.root, name)
    }

    /// Next table id, a decimal string.
    pub fn table_index_node(&self) -> String {
        format!("{}/table/data/table_index", self.root)
    }

    /// Next op id, a decimal string.
    pub fn op_index_node(&self) -> String {
        format!("{}/table/data/op_index", self.root)
    }

    /// Directory of in-flight op records, one child per op id.
    pub fn op_dir(&self) -> String {
        format!("{}/table/data/op_task", self.root)
    }

    pub fn op_node(&self, op_id: u64) -> String {
        format!("{}/table/data/op_task/{}", self.root, op_id)
    }

    /// Directory tablets register their ephemeral presence in.
    pub fn nodes_dir(&self) -> String {
        format!("{}/nodes", self.root)
    }

    pub fn node_entry(&self, endpoint: &str) -> String {
        format!("{}/nodes/{}", self.root, endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_layout() {
        let paths = CoordPaths::new("/tablens");
        assert_eq!(paths.leader_node(), "/tablens/leader/lock");
        assert_eq!(paths.table_node("t1"), "/tablens/table/t1");
        assert_eq!(paths.table_index_node(), "/tablens/table/data/table_index");
        assert_eq!(paths.op_index_node(), "/tablens/table/data/op_index");
        assert_eq!(paths.op_node(7), "/tablens/table/data/op_task/7");
        assert_eq!(paths.node_entry("10.0.0.1:9090"), "/tablens/nodes/10.0.0.1:9090");
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let paths = CoordPaths::new("/tablens/");
        assert_eq!(paths.table_dir(), "/tablens/table");
    }
}
