//! Name server core
//!
//! One instance of [`NameServer`] exists per process. A single coarse mutex
//! guards the tablet registry, the table catalog, the operation log, and
//! the in-memory id counters; every coordination-service or tablet RPC
//! happens with the lock released, so handlers snapshot what they need,
//! drop the lock, do the I/O, then reacquire to publish results.
//!
//! Leadership is pushed in from the distributed lock through [`LeaderGate`]:
//! on acquisition the server recovers durable state and starts the task
//! engine; on loss it clears `running` and the engine winds down.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{mpsc, Notify};

use crate::common::{Error, NameServerConfig, Result};
use crate::coord::{CoordClient, CoordPaths, CreateMode, LockListener};
use crate::nameserver::catalog::TableMeta;
use crate::nameserver::oplog::{OpData, OpRecord, OpType, Task, TaskKind, TaskStatus};
use crate::nameserver::registry::{self, TabletInfo, TabletRow};
use crate::nameserver::tablet_client::TabletClientFactory;
use crate::nameserver::tasks;

pub(crate) struct Inner {
    pub tablets: HashMap<String, TabletInfo>,
    pub tables: HashMap<String, TableMeta>,
    pub task_map: BTreeMap<u64, OpData>,
    pub table_index: u64,
    pub op_index: u64,
}

impl Inner {
    fn new() -> Self {
        Self {
            tablets: HashMap::new(),
            tables: HashMap::new(),
            task_map: BTreeMap::new(),
            table_index: 0,
            op_index: 0,
        }
    }
}

/// Counters for the admin status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSummary {
    pub is_leader: bool,
    pub endpoint: String,
    pub nb_tablets: usize,
    pub nb_healthy_tablets: usize,
    pub nb_tables: usize,
    pub nb_ops: usize,
}

pub struct NameServer {
    pub(crate) config: NameServerConfig,
    pub(crate) coord: Arc<dyn CoordClient>,
    pub(crate) paths: CoordPaths,
    factory: Arc<dyn TabletClientFactory>,
    inner: Mutex<Inner>,
    running: AtomicBool,
    pub(crate) task_notify: Notify,
    /// Serializes the durable read-modify-write of the id counters across
    /// concurrent admin RPCs. Never held while `inner` is locked.
    index_lock: tokio::sync::Mutex<()>,
}

impl NameServer {
    pub fn new(
        config: NameServerConfig,
        coord: Arc<dyn CoordClient>,
        factory: Arc<dyn TabletClientFactory>,
    ) -> Self {
        let paths = CoordPaths::new(&config.coord_root_path);
        Self {
            config,
            coord,
            paths,
            factory,
            inner: Mutex::new(Inner::new()),
            running: AtomicBool::new(false),
            task_notify: Notify::new(),
            index_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    /// Snapshot the registry into `(endpoint, state, age)` rows.
    pub fn show_tablet(&self) -> Vec<TabletRow> {
        registry::show_tablet(&self.lock_inner().tablets)
    }

    pub fn status_summary(&self) -> StatusSummary {
        let inner = self.lock_inner();
        StatusSummary {
            is_leader: self.is_running(),
            endpoint: self.config.endpoint.clone(),
            nb_tablets: inner.tablets.len(),
            nb_healthy_tablets: inner
                .tablets
                .values()
                .filter(|t| t.state.is_healthy())
                .count(),
            nb_tables: inner.tables.len(),
            nb_ops: inner.task_map.len(),
        }
    }

    /// Create a table: assign the next table id, persist the catalog entry,
    /// then enqueue the per-partition creation op.
    pub async fn create_table(&self, mut meta: TableMeta) -> Result<()> {
        if !self.is_running() {
            return Err(Error::NotLeader);
        }
        meta.validate()?;
        {
            let inner = self.lock_inner();
            if inner.tables.contains_key(&meta.name) {
                return Err(Error::TableExists(meta.name));
            }
        }

        let index_node = self.paths.table_index_node();
        let table_index = {
            let _guard = self.index_lock.lock().await;
            let raw = self
                .coord
                .get(&index_node)
                .await
                .map_err(|_| Error::Coordination("get table index node failed".into()))?;
            let table_index: u64 = std::str::from_utf8(&raw)
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .ok_or_else(|| Error::Coordination("get table index node failed".into()))?;
            self.coord
                .set(&index_node, (table_index + 1).to_string().as_bytes())
                .await
                .map_err(|_| Error::Coordination("set table index node failed".into()))?;
            table_index
        };

        meta.tid = table_index as u32;
        let value = serde_json::to_vec(&meta)?;
        self.coord
            .create(
                &self.paths.table_node(&meta.name),
                &value,
                CreateMode::Persistent,
            )
            .await
            .map_err(|_| Error::Coordination("create table node failed".into()))?;
        tracing::info!(table = %meta.name, tid = meta.tid, "table created");

        {
            let mut inner = self.lock_inner();
            inner.table_index = table_index + 1;
            inner.tables.insert(meta.name.clone(), meta.clone());
        }

        // partition fan-out rides the op log so it survives leader changes;
        // the catalog entry is already durable, so a filing failure only
        // delays the tablet-side creation until re-issued
        if let Err(err) = self.file_create_table_op(&meta).await {
            tracing::warn!(table = %meta.name, error = %err, "failed to enqueue create-partition op");
        }
        Ok(())
    }

    /// Snapshot one partition of a table on its leader replica.
    /// Returns the id of the enqueued op.
    pub async fn make_snapshot(&self, name: &str, pid: u32) -> Result<u64> {
        if !self.is_running() {
            return Err(Error::NotLeader);
        }
        let (tid, endpoint) = {
            let inner = self.lock_inner();
            let meta = inner
                .tables
                .get(name)
                .ok_or_else(|| Error::TableNotFound(name.to_string()))?;
            let endpoint = meta
                .leader_endpoint(pid)
                .ok_or(Error::PartitionNotFound(pid))?
                .to_string();
            match inner.tablets.get(&endpoint) {
                Some(info) if info.state.is_healthy() => {}
                _ => return Err(Error::TabletOffline(endpoint)),
            }
            (meta.tid, endpoint)
        };

        let data = serde_json::json!({ "name": name, "pid": pid });
        let task = Task {
            op_id: 0,
            op_type: OpType::MakeSnapshot,
            kind: TaskKind::MakeSnapshot { tid, pid },
            status: TaskStatus::Doing,
            endpoint,
        };
        self.file_op(OpType::MakeSnapshot, data, VecDeque::from([task]))
            .await
    }

    fn build_create_table_tasks(meta: &TableMeta) -> VecDeque<Task> {
        let mut tasks = VecDeque::new();
        // follower replicas first so the leader task can hand the tablet
        // its replica list
        for pid in meta.pids() {
            for endpoint in meta.follower_endpoints(pid) {
                tasks.push_back(Task {
                    op_id: 0,
                    op_type: OpType::CreateTable,
                    kind: TaskKind::CreateTable {
                        name: meta.name.clone(),
                        tid: meta.tid,
                        pid,
                        ttl: meta.ttl,
                        is_leader: false,
                        replicas: Vec::new(),
                    },
                    status: TaskStatus::Doing,
                    endpoint,
                });
            }
        }
        for pid in meta.pids() {
            if let Some(endpoint) = meta.leader_endpoint(pid) {
                tasks.push_back(Task {
                    op_id: 0,
                    op_type: OpType::CreateTable,
                    kind: TaskKind::CreateTable {
                        name: meta.name.clone(),
                        tid: meta.tid,
                        pid,
                        ttl: meta.ttl,
                        is_leader: true,
                        replicas: meta.follower_endpoints(pid),
                    },
                    status: TaskStatus::Doing,
                    endpoint: endpoint.to_string(),
                });
            }
        }
        tasks
    }

    async fn file_create_table_op(&self, meta: &TableMeta) -> Result<u64> {
        let tasks = Self::build_create_table_tasks(meta);
        let data = serde_json::to_value(meta)?;
        self.file_op(OpType::CreateTable, data, tasks).await
    }

    /// Allocate the next op id, persist the op record, then expose the op
    /// to the task engine. The durable `op_index` is advanced first and the
    /// op is filed under the value just stored, so the two always agree.
    async fn file_op(
        &self,
        op_type: OpType,
        data: serde_json::Value,
        mut tasks: VecDeque<Task>,
    ) -> Result<u64> {
        let _guard = self.index_lock.lock().await;
        let op_id = self.lock_inner().op_index + 1;
        self.coord
            .set(&self.paths.op_index_node(), op_id.to_string().as_bytes())
            .await
            .map_err(|_| Error::Coordination("set op index node failed".into()))?;
        self.lock_inner().op_index = op_id;

        for task in tasks.iter_mut() {
            task.op_id = op_id;
        }
        let mut op = OpData::new(op_id, op_type, data);
        op.tasks = tasks;

        let value = serde_json::to_vec(&op.to_record())?;
        self.coord
            .create(&self.paths.op_node(op_id), &value, CreateMode::Persistent)
            .await
            .map_err(|_| Error::Coordination("create op node failed".into()))?;

        self.lock_inner().task_map.insert(op_id, op);
        self.task_notify.notify_one();
        tracing::info!(op_id, op_type = ?op_type, "operation enqueued");
        Ok(op_id)
    }

    async fn read_or_init_index(&self, path: &str, label: &str) -> Result<u64> {
        match self.coord.get(path).await {
            Ok(raw) => std::str::from_utf8(&raw)
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .ok_or_else(|| Error::Coordination(format!("parse {} node failed", label))),
            Err(Error::NodeNotFound(_)) => {
                self.coord.create(path, b"1", CreateMode::Persistent).await?;
                tracing::info!(label, "initialized index to 1");
                Ok(1)
            }
            Err(err) => Err(err),
        }
    }

    /// Rebuild in-memory state from durable storage on leadership
    /// acquisition. Returns the armed membership watch; the caller spawns
    /// the actor that consumes it.
    pub async fn recover(&self) -> Result<mpsc::UnboundedReceiver<Vec<String>>> {
        let table_index = self
            .read_or_init_index(&self.paths.table_index_node(), "table_index")
            .await?;
        let op_index = self
            .read_or_init_index(&self.paths.op_index_node(), "op_index")
            .await?;

        let mut tables = HashMap::new();
        for name in self.coord.list_children(&self.paths.table_dir()).await? {
            if name == "data" {
                // the data subtree holds the indices and op records
                continue;
            }
            let raw = self.coord.get(&self.paths.table_node(&name)).await?;
            match serde_json::from_slice::<TableMeta>(&raw) {
                Ok(meta) => {
                    tables.insert(name, meta);
                }
                Err(err) => {
                    tracing::warn!(table = %name, error = %err, "skipping unparsable table record")
                }
            }
        }

        let mut task_map = BTreeMap::new();
        for child in self.coord.list_children(&self.paths.op_dir()).await? {
            let op_id: u64 = match child.parse() {
                Ok(id) => id,
                Err(_) => {
                    tracing::warn!(node = %child, "skipping non-numeric op node");
                    continue;
                }
            };
            let raw = self.coord.get(&self.paths.op_node(op_id)).await?;
            match serde_json::from_slice::<OpRecord>(&raw) {
                Ok(record) => {
                    task_map.insert(op_id, OpData::from_record(record));
                }
                Err(err) => {
                    tracing::warn!(op_id, error = %err, "skipping unparsable op record")
                }
            }
        }

        let endpoints = self.coord.list_children(&self.paths.nodes_dir()).await?;
        let watch = self.coord.watch_children(&self.paths.nodes_dir()).await?;

        {
            let mut inner = self.lock_inner();
            inner.table_index = table_index;
            inner.op_index = op_index;
            inner.tables = tables;
            inner.task_map = task_map;
            registry::update_tablets(&mut inner.tablets, &endpoints, self.factory.as_ref());
            tracing::info!(
                table_index,
                op_index,
                tables = inner.tables.len(),
                ops = inner.task_map.len(),
                tablets = inner.tablets.len(),
                "recovery complete"
            );
        }
        self.task_notify.notify_one();
        Ok(watch)
    }

    pub(crate) async fn become_leader(ns: &Arc<Self>) {
        tracing::info!("become the leader name server");
        match ns.recover().await {
            Ok(watch) => spawn_membership_actor(ns.clone(), watch),
            Err(err) => {
                tracing::error!(error = %err, "recovery failed; serving with partial state")
            }
        }
        ns.running.store(true, Ordering::Release);
        tasks::spawn_task_engine(ns.clone());
    }

    pub(crate) fn become_standby(&self) {
        tracing::info!("become the standby name server");
        self.running.store(false, Ordering::Release);
        // wake the driver so it observes the demotion promptly
        self.task_notify.notify_one();
    }

    #[cfg(test)]
    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }
}

/// Consumes membership snapshots until the watch dies with the session.
fn spawn_membership_actor(ns: Arc<NameServer>, mut watch: mpsc::UnboundedReceiver<Vec<String>>) {
    tokio::spawn(async move {
        while let Some(endpoints) = watch.recv().await {
            let mut inner = ns.lock_inner();
            registry::update_tablets(&mut inner.tablets, &endpoints, ns.factory.as_ref());
        }
        tracing::info!("membership watch closed");
    });
}

/// Adapter between the distributed lock and the server: the lock holds only
/// this listener, never the server type itself.
pub struct LeaderGate {
    ns: Arc<NameServer>,
}

impl LeaderGate {
    pub fn new(ns: Arc<NameServer>) -> Arc<Self> {
        Arc::new(Self { ns })
    }
}

#[async_trait]
impl LockListener for LeaderGate {
    async fn on_locked(&self) {
        NameServer::become_leader(&self.ns).await;
    }

    async fn on_lost_lock(&self) {
        self.ns.become_standby();
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::coord::{MemoryCoordClient, MemoryCoordination};
    use crate::nameserver::tablet_client::testing::MockTabletFactory;

    pub(crate) struct TestCluster {
        pub coordination: MemoryCoordination,
        pub ns: Arc<NameServer>,
        pub factory: Arc<MockTabletFactory>,
        /// A second session used to mutate the tree from "outside".
        pub admin: MemoryCoordClient,
    }

    pub(crate) fn new_test_cluster() -> TestCluster {
        let coordination = MemoryCoordination::new();
        let factory = Arc::new(MockTabletFactory::default());
        let config = NameServerConfig {
            endpoint: "ns1:9527".into(),
            coord_root_path: "/t".into(),
            task_status_interval_ms: 20,
            ..Default::default()
        };
        let ns = Arc::new(NameServer::new(
            config,
            Arc::new(coordination.client()),
            factory.clone(),
        ));
        let admin = coordination.client();
        TestCluster {
            coordination,
            ns,
            factory,
            admin,
        }
    }

    /// Register a tablet endpoint in the membership directory.
    pub(crate) async fn register_tablet(cluster: &TestCluster, endpoint: &str) {
        cluster
            .admin
            .create(
                &cluster.ns.paths.node_entry(endpoint),
                b"",
                CreateMode::Ephemeral,
            )
            .await
            .unwrap();
    }
}
