//! Table catalog types
//!
//! A table is a set of partitions, each replicated across tablets with
//! exactly one leader replica. The catalog entry is what gets persisted
//! under the table directory of the coordination service.

use serde::{Deserialize, Serialize};

/// One replica of one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TablePartition {
    pub pid: u32,
    pub endpoint: String,
    pub is_leader: bool,
}

/// Catalog entry for a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMeta {
    pub name: String,
    /// Assigned by the name server at creation time.
    #[serde(default)]
    pub tid: u32,
    #[serde(default)]
    pub ttl: u64,
    pub partitions: Vec<TablePartition>,
}

impl TableMeta {
    /// Check structural invariants: a non-empty name, at least one
    /// partition, no duplicate (pid, endpoint) pairs, and exactly one
    /// leader replica per partition id.
    pub fn validate(&self) -> crate::Result<()> {
        if self.name.is_empty() {
            return Err(crate::Error::InvalidMeta("table name is empty".into()));
        }
        if self.partitions.is_empty() {
            return Err(crate::Error::InvalidMeta(format!(
                "table {} has no partitions",
                self.name
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for p in &self.partitions {
            if !seen.insert((p.pid, p.endpoint.clone())) {
                return Err(crate::Error::InvalidMeta(format!(
                    "duplicate replica for partition {} on {}",
                    p.pid, p.endpoint
                )));
            }
        }
        for pid in self.pids() {
            let leaders = self
                .partitions
                .iter()
                .filter(|p| p.pid == pid && p.is_leader)
                .count();
            if leaders != 1 {
                return Err(crate::Error::InvalidMeta(format!(
                    "partition {} has {} leader replicas",
                    pid, leaders
                )));
            }
        }
        Ok(())
    }

    /// Distinct partition ids, ascending.
    pub fn pids(&self) -> Vec<u32> {
        let mut pids: Vec<u32> = self.partitions.iter().map(|p| p.pid).collect();
        pids.sort_unstable();
        pids.dedup();
        pids
    }

    /// Endpoint of the leader replica of a partition.
    pub fn leader_endpoint(&self, pid: u32) -> Option<&str> {
        self.partitions
            .iter()
            .find(|p| p.pid == pid && p.is_leader)
            .map(|p| p.endpoint.as_str())
    }

    /// Endpoints of the follower replicas of a partition.
    pub fn follower_endpoints(&self, pid: u32) -> Vec<String> {
        self.partitions
            .iter()
            .filter(|p| p.pid == pid && !p.is_leader)
            .map(|p| p.endpoint.clone())
            .collect()
    }
}
