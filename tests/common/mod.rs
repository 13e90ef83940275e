//! Shared fixtures for integration tests: an in-process coordination tree,
//! scriptable tablets, and name-server instances wired to the real lock.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tablens::common::Result;
use tablens::coord::{
    spawn_lock, CoordClient, CoordPaths, CreateMode, MemoryCoordClient, MemoryCoordination,
};
use tablens::nameserver::catalog::{TableMeta, TablePartition};
use tablens::nameserver::oplog::{TaskStatus, TaskType};
use tablens::nameserver::tablet_client::{TabletClient, TabletClientFactory, TaskStatusEntry};
use tablens::nameserver::{LeaderGate, NameServer};
use tablens::NameServerConfig;

pub const ROOT: &str = "/t";

/// A tablet that records every call and serves scripted status reports.
pub struct MockTablet {
    endpoint: String,
    pub snapshots: Mutex<Vec<(u32, u32)>>,
    pub created: Mutex<Vec<(String, u32, u32, bool)>>,
    pub deleted: Mutex<Vec<Vec<u64>>>,
    statuses: Mutex<HashMap<u64, TaskStatusEntry>>,
}

impl MockTablet {
    fn new(endpoint: &str) -> Arc<Self> {
        Arc::new(Self {
            endpoint: endpoint.to_string(),
            snapshots: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            statuses: Mutex::new(HashMap::new()),
        })
    }

    /// Script the cumulative status this tablet reports for an op.
    pub fn report(&self, op_id: u64, task_type: TaskType, status: TaskStatus) {
        self.statuses.lock().unwrap().insert(
            op_id,
            TaskStatusEntry {
                op_id,
                task_type,
                status,
            },
        );
    }

    pub fn snapshot_calls(&self) -> usize {
        self.snapshots.lock().unwrap().len()
    }

    pub fn deletions(&self) -> Vec<Vec<u64>> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl TabletClient for MockTablet {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn create_table(
        &self,
        name: &str,
        tid: u32,
        pid: u32,
        _ttl: u64,
        is_leader: bool,
        _replicas: &[String],
    ) -> Result<bool> {
        self.created
            .lock()
            .unwrap()
            .push((name.to_string(), tid, pid, is_leader));
        Ok(true)
    }

    async fn make_snapshot(&self, tid: u32, pid: u32) -> Result<bool> {
        self.snapshots.lock().unwrap().push((tid, pid));
        Ok(true)
    }

    async fn get_task_status(&self) -> Result<Vec<TaskStatusEntry>> {
        Ok(self.statuses.lock().unwrap().values().cloned().collect())
    }

    async fn delete_op_task(&self, op_ids: &[u64]) -> Result<bool> {
        self.deleted.lock().unwrap().push(op_ids.to_vec());
        let mut statuses = self.statuses.lock().unwrap();
        for id in op_ids {
            statuses.remove(id);
        }
        Ok(true)
    }
}

/// Hands out one [`MockTablet`] per endpoint, shared across every name
/// server in a harness.
#[derive(Default)]
pub struct MockTabletFactory {
    tablets: Mutex<HashMap<String, Arc<MockTablet>>>,
}

impl MockTabletFactory {
    pub fn get(&self, endpoint: &str) -> Arc<MockTablet> {
        self.tablets
            .lock()
            .unwrap()
            .entry(endpoint.to_string())
            .or_insert_with(|| MockTablet::new(endpoint))
            .clone()
    }
}

impl TabletClientFactory for MockTabletFactory {
    fn client(&self, endpoint: &str) -> Result<Arc<dyn TabletClient>> {
        Ok(self.get(endpoint))
    }
}

/// One simulated cluster: a coordination tree, tablets, and name servers.
pub struct TestHarness {
    pub coordination: MemoryCoordination,
    pub factory: Arc<MockTabletFactory>,
    /// An extra session for inspecting the tree from "outside".
    pub admin: MemoryCoordClient,
}

impl TestHarness {
    pub fn new() -> Self {
        let coordination = MemoryCoordination::new();
        let admin = coordination.client();
        Self {
            coordination,
            factory: Arc::new(MockTabletFactory::default()),
            admin,
        }
    }

    /// Start a name-server instance contending for the leader lock.
    /// Returns the server and its coordination session (expire it to force
    /// a failover).
    pub fn start_nameserver(&self, name: &str) -> (Arc<NameServer>, Arc<MemoryCoordClient>) {
        let coord = Arc::new(self.coordination.client());
        let endpoint = format!("{}:9527", name);
        let config = NameServerConfig {
            endpoint: endpoint.clone(),
            coord_root_path: ROOT.into(),
            task_status_interval_ms: 20,
            ..Default::default()
        };
        let ns = Arc::new(NameServer::new(config, coord.clone(), self.factory.clone()));
        spawn_lock(
            coord.clone(),
            CoordPaths::new(ROOT),
            endpoint,
            LeaderGate::new(ns.clone()),
        );
        (ns, coord)
    }

    /// Register a tablet in the membership directory; its presence lives
    /// and dies with the returned session.
    pub async fn register_tablet(&self, endpoint: &str) -> MemoryCoordClient {
        let session = self.coordination.client();
        session
            .create(
                &CoordPaths::new(ROOT).node_entry(endpoint),
                b"",
                CreateMode::Ephemeral,
            )
            .await
            .unwrap();
        session
    }

    pub async fn read_node(&self, path: &str) -> Result<Vec<u8>> {
        self.admin.get(path).await
    }

    pub fn paths(&self) -> CoordPaths {
        CoordPaths::new(ROOT)
    }
}

/// Poll until a condition holds or five seconds pass.
pub async fn wait_until<F: FnMut() -> bool>(mut cond: F, what: &str) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

/// A single-partition table led by `endpoint`.
pub fn one_partition_meta(name: &str, endpoint: &str) -> TableMeta {
    TableMeta {
        name: name.into(),
        tid: 0,
        ttl: 0,
        partitions: vec![TablePartition {
            pid: 0,
            endpoint: endpoint.into(),
            is_leader: true,
        }],
    }
}

/// Drive the create-table fan-out op (id 2 on a fresh tree: ids start past
/// the initial counter value) to completion so later assertions see only
/// the ops under test.
pub async fn settle_create_table_op(harness: &TestHarness, ns: &Arc<NameServer>, endpoint: &str) {
    let tablet = harness.factory.get(endpoint);
    wait_until(
        || !tablet.created.lock().unwrap().is_empty(),
        "create-table task submitted",
    )
    .await;
    tablet.report(2, TaskType::CreateTable, TaskStatus::Done);
    wait_until(|| ns.status_summary().nb_ops == 0, "create-table op reaped").await;
    assert!(matches!(
        harness.admin.get(&harness.paths().op_node(2)).await,
        Err(tablens::Error::NodeNotFound(_))
    ));
}
