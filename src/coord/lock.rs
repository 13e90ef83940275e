//! Distributed lock for name-server leader election
//!
//! One ephemeral node under a well-known path; whoever creates it is the
//! leader until its session dies or the node is deleted. Contenders watch
//! the lock directory and recontend when the holder disappears. The lock
//! holds only a [`LockListener`], never the concrete server type, so the
//! server can own the lock task without a reference cycle.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{CoordClient, CoordPaths, CreateMode};
use crate::common::Error;

/// Entry points invoked on leadership transitions.
///
/// Invocations alternate strictly: `on_locked`, `on_lost_lock`,
/// `on_locked`, ... with each fired exactly once per transition.
#[async_trait]
pub trait LockListener: Send + Sync {
    async fn on_locked(&self);
    async fn on_lost_lock(&self);
}

const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Run leader election forever on a background task.
pub fn spawn_lock(
    coord: Arc<dyn CoordClient>,
    paths: CoordPaths,
    endpoint: String,
    listener: Arc<dyn LockListener>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        run(coord, paths, endpoint, listener).await;
    })
}

async fn run(
    coord: Arc<dyn CoordClient>,
    paths: CoordPaths,
    endpoint: String,
    listener: Arc<dyn LockListener>,
) {
    let lock_node = paths.leader_node();
    let lock_name = lock_node.rsplit('/').next().unwrap().to_string();
    loop {
        if !coord.is_connected() {
            // the keepalive task owns reconnection
            tokio::time::sleep(RETRY_DELAY).await;
            continue;
        }
        // the lock payload is our endpoint, for observability
        match coord
            .create(&lock_node, endpoint.as_bytes(), CreateMode::Ephemeral)
            .await
        {
            Ok(()) => {
                tracing::info!(endpoint = %endpoint, "acquired leader lock");
                listener.on_locked().await;
                hold(coord.as_ref(), &paths, &lock_name).await;
                tracing::info!(endpoint = %endpoint, "lost leader lock");
                listener.on_lost_lock().await;
            }
            Err(Error::NodeExists(_)) => {
                wait_for_release(coord.as_ref(), &paths, &lock_name).await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "leader lock contention failed");
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
    }
}

/// Block until the held lock is gone: the lock node disappeared or the
/// session died (watch channel closed).
async fn hold(coord: &dyn CoordClient, paths: &CoordPaths, lock_name: &str) {
    match coord.watch_children(&paths.leader_dir()).await {
        Ok(mut rx) => {
            while let Some(children) = rx.recv().await {
                if !children.iter().any(|c| c == lock_name) {
                    return;
                }
            }
        }
        Err(_) => {
            // session already gone, nothing left to hold
        }
    }
}

/// Block until the lock node is free or our session dies.
async fn wait_for_release(coord: &dyn CoordClient, paths: &CoordPaths, lock_name: &str) {
    match coord.watch_children(&paths.leader_dir()).await {
        Ok(mut rx) => {
            while let Some(children) = rx.recv().await {
                if !children.iter().any(|c| c == lock_name) {
                    return;
                }
            }
        }
        Err(_) => tokio::time::sleep(RETRY_DELAY).await,
    }
}
