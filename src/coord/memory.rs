//! In-process coordination service
//!
//! A shared hierarchical store with sessions, ephemeral node ownership and
//! child watches. Every [`MemoryCoordClient`] handed out by
//! [`MemoryCoordination::client`] is an independent session against the same
//! tree, so one instance can back a whole simulated cluster: name servers,
//! tablets registering ephemeral presence, and tests expiring sessions at
//! will. For production deployments, back [`CoordClient`] with a real
//! ZooKeeper or etcd client instead.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{CoordClient, CreateMode};
use crate::common::{Error, Result};

struct Node {
    value: Vec<u8>,
    ephemeral_owner: Option<u64>,
}

struct Watch {
    session: u64,
    tx: mpsc::UnboundedSender<Vec<String>>,
}

#[derive(Default)]
struct Store {
    nodes: BTreeMap<String, Node>,
    // keyed by the watched directory path
    watches: HashMap<String, Vec<Watch>>,
}

/// All ancestor directories of a path, nearest first, excluding "/".
fn ancestors(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut end = path.len();
    while let Some(idx) = path[..end].rfind('/') {
        if idx == 0 {
            break;
        }
        out.push(path[..idx].to_string());
        end = idx;
    }
    out
}

impl Store {
    fn children_of(&self, path: &str) -> Vec<String> {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let mut out = BTreeSet::new();
        for key in self.nodes.keys() {
            if let Some(rest) = key.strip_prefix(&prefix) {
                if rest.is_empty() {
                    continue;
                }
                out.insert(rest.split('/').next().unwrap().to_string());
            }
        }
        out.into_iter().collect()
    }

    fn fire_watches(&mut self, dirs: &BTreeSet<String>) {
        for dir in dirs {
            let children = self.children_of(dir);
            if let Some(watches) = self.watches.get_mut(dir) {
                watches.retain(|w| w.tx.send(children.clone()).is_ok());
            }
        }
    }

    /// Remove a session's watches and ephemeral nodes; returns the
    /// directories whose children changed.
    fn drop_session(&mut self, session: u64) -> BTreeSet<String> {
        for watches in self.watches.values_mut() {
            watches.retain(|w| w.session != session);
        }
        self.watches.retain(|_, v| !v.is_empty());

        let dead: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.ephemeral_owner == Some(session))
            .map(|(k, _)| k.clone())
            .collect();
        let mut affected = BTreeSet::new();
        for path in dead {
            self.nodes.remove(&path);
            affected.extend(ancestors(&path));
        }
        affected
    }
}

/// The shared tree a simulated cluster coordinates through.
pub struct MemoryCoordination {
    store: Arc<Mutex<Store>>,
    next_session: Arc<AtomicU64>,
}

impl MemoryCoordination {
    pub fn new() -> Self {
        Self {
            store: Arc::new(Mutex::new(Store::default())),
            next_session: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Open a new session against the shared tree.
    pub fn client(&self) -> MemoryCoordClient {
        MemoryCoordClient {
            store: self.store.clone(),
            next_session: self.next_session.clone(),
            session: AtomicU64::new(self.next_session.fetch_add(1, Ordering::SeqCst)),
            connected: AtomicBool::new(true),
        }
    }
}

impl Default for MemoryCoordination {
    fn default() -> Self {
        Self::new()
    }
}

/// One session against a [`MemoryCoordination`] tree.
pub struct MemoryCoordClient {
    store: Arc<Mutex<Store>>,
    next_session: Arc<AtomicU64>,
    session: AtomicU64,
    connected: AtomicBool,
}

impl MemoryCoordClient {
    /// Kill the current session, as if the service expired it. Ephemeral
    /// nodes owned by it vanish and its watch channels close.
    pub fn expire_session(&self) {
        self.connected.store(false, Ordering::Release);
        let session = self.session.load(Ordering::Acquire);
        let mut store = self.store.lock().unwrap();
        let affected = store.drop_session(session);
        store.fire_watches(&affected);
    }

    fn check_connected(&self) -> Result<()> {
        if self.connected.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(Error::SessionLost)
        }
    }
}

#[async_trait]
impl CoordClient for MemoryCoordClient {
    async fn create(&self, path: &str, value: &[u8], mode: CreateMode) -> Result<()> {
        self.check_connected()?;
        let mut store = self.store.lock().unwrap();
        if store.nodes.contains_key(path) {
            return Err(Error::NodeExists(path.to_string()));
        }
        let ephemeral_owner = match mode {
            CreateMode::Ephemeral => Some(self.session_id()),
            CreateMode::Persistent => None,
        };
        store.nodes.insert(
            path.to_string(),
            Node {
                value: value.to_vec(),
                ephemeral_owner,
            },
        );
        let affected = ancestors(path).into_iter().collect();
        store.fire_watches(&affected);
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        self.check_connected()?;
        let store = self.store.lock().unwrap();
        store
            .nodes
            .get(path)
            .map(|n| n.value.clone())
            .ok_or_else(|| Error::NodeNotFound(path.to_string()))
    }

    async fn set(&self, path: &str, value: &[u8]) -> Result<()> {
        self.check_connected()?;
        let mut store = self.store.lock().unwrap();
        match store.nodes.get_mut(path) {
            Some(node) => {
                node.value = value.to_vec();
                Ok(())
            }
            None => Err(Error::NodeNotFound(path.to_string())),
        }
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.check_connected()?;
        let mut store = self.store.lock().unwrap();
        if store.nodes.remove(path).is_none() {
            return Err(Error::NodeNotFound(path.to_string()));
        }
        let affected = ancestors(path).into_iter().collect();
        store.fire_watches(&affected);
        Ok(())
    }

    async fn list_children(&self, path: &str) -> Result<Vec<String>> {
        self.check_connected()?;
        let store = self.store.lock().unwrap();
        Ok(store.children_of(path))
    }

    async fn watch_children(&self, path: &str) -> Result<mpsc::UnboundedReceiver<Vec<String>>> {
        self.check_connected()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let mut store = self.store.lock().unwrap();
        // Deliver the current snapshot up front so the consumer never races
        // a change that happened between listing and watching.
        let _ = tx.send(store.children_of(path));
        store.watches.entry(path.to_string()).or_default().push(Watch {
            session: self.session_id(),
            tx,
        });
        Ok(rx)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn session_id(&self) -> u64 {
        self.session.load(Ordering::Acquire)
    }

    async fn reconnect(&self) -> Result<()> {
        let old = self.session.load(Ordering::Acquire);
        {
            let mut store = self.store.lock().unwrap();
            let affected = store.drop_session(old);
            store.fire_watches(&affected);
        }
        self.session
            .store(self.next_session.fetch_add(1, Ordering::SeqCst), Ordering::Release);
        self.connected.store(true, Ordering::Release);
        Ok(())
    }
}
