//! Task engine
//!
//! Three cooperating background activities drive the operation log once the
//! instance is leader:
//!
//! - the **status poller** asks every healthy tablet for the cumulative
//!   status of its tasks and folds the replies into the op FIFOs;
//! - the **driver** pops finished head tasks, re-submits the in-flight
//!   head of every op (tablet RPCs are idempotent per (op id, task type)),
//!   republishes the durable op records, and triggers the reaper;
//! - the **reaper** tells every healthy tablet to forget finished ops and
//!   only then deletes the durable record and the in-memory entry.
//!
//! All three inspect and mutate state under the global lock but perform
//! every RPC with the lock released.

use std::sync::Arc;
use std::time::Duration;

use crate::common::Error;
use crate::nameserver::core::{Inner, NameServer};
use crate::nameserver::oplog::{Task, TaskKind, TaskStatus};
use crate::nameserver::registry;
use crate::nameserver::tablet_client::{TabletClient, TaskStatusEntry};

/// Pause between driver passes while ops are in flight; new ops cut it
/// short through the notify.
const DRIVE_PAUSE_MS: u64 = 100;

pub(crate) fn spawn_task_engine(ns: Arc<NameServer>) {
    let poller = ns.clone();
    tokio::spawn(async move {
        poll_task_status(poller).await;
    });
    tokio::spawn(async move {
        process_tasks(ns).await;
    });
}

async fn poll_task_status(ns: Arc<NameServer>) {
    let period = Duration::from_millis(ns.config.task_status_interval_ms);
    loop {
        tokio::time::sleep(period).await;
        if !ns.is_running() {
            tracing::debug!("demoted; status poller exiting");
            return;
        }
        update_task_status(&ns).await;
    }
}

/// One poller cycle: snapshot healthy clients under the lock, fan
/// `get_task_status` out with the lock released, fold replies back in.
pub(crate) async fn update_task_status(ns: &NameServer) {
    let clients = registry::healthy_clients(&ns.lock_inner().tablets);
    for client in clients {
        match client.get_task_status().await {
            Ok(entries) => {
                let mut inner = ns.lock_inner();
                for entry in entries {
                    apply_status(&mut inner, client.endpoint(), &entry);
                }
            }
            Err(err) => {
                // reflected as an absent status advance; next cycle retries
                tracing::debug!(endpoint = %client.endpoint(), error = %err, "get task status failed");
            }
        }
    }
}

fn apply_status(inner: &mut Inner, source_endpoint: &str, entry: &TaskStatusEntry) {
    let Some(op) = inner.task_map.get_mut(&entry.op_id) else {
        tracing::warn!(op_id = entry.op_id, "status report for unknown op");
        return;
    };
    let Some(head) = op.tasks.front_mut() else {
        return;
    };
    // only the in-flight head is updated, and only by its own target:
    // tablets report cumulatively, so a finished earlier step of the same
    // kind would otherwise bleed into a later step on another tablet
    if head.kind.task_type() == entry.task_type && head.endpoint == source_endpoint {
        if head.status != entry.status {
            tracing::debug!(
                op_id = entry.op_id,
                from = %head.status,
                to = %entry.status,
                "task status updated"
            );
        }
        head.status = entry.status;
    }
}

/// The driver loop. Sleeps while there is nothing to drive and exits when
/// the instance is demoted.
async fn process_tasks(ns: Arc<NameServer>) {
    loop {
        loop {
            if !ns.is_running() {
                tracing::debug!("demoted; driver exiting");
                return;
            }
            if !ns.lock_inner().task_map.is_empty() {
                break;
            }
            ns.task_notify.notified().await;
        }

        let run_ops = advance_ops(&ns);
        publish_op_status(&ns, &run_ops).await;
        reap_finished_ops(&ns).await;

        // statuses only move on poller cycles; pace the rescan but let new
        // ops cut the wait short
        let _ = tokio::time::timeout(
            Duration::from_millis(DRIVE_PAUSE_MS),
            ns.task_notify.notified(),
        )
        .await;
    }
}

/// Advance every op's FIFO head and submit in-flight tasks. Returns the ids
/// of ops whose durable record needs republishing.
pub(crate) fn advance_ops(ns: &NameServer) -> Vec<u64> {
    let mut run_ops = Vec::new();
    let mut submissions: Vec<(Arc<dyn TabletClient>, Task)> = Vec::new();
    {
        let mut inner = ns.lock_inner();
        let Inner {
            task_map, tablets, ..
        } = &mut *inner;
        for (op_id, op) in task_map.iter_mut() {
            let Some(head) = op.tasks.front() else {
                continue;
            };
            match head.status {
                TaskStatus::Done => {
                    op.tasks.pop_front();
                }
                TaskStatus::Failed => {
                    // held in place; richer recovery is a followup
                    tracing::warn!(op_id = *op_id, "head task failed; op held");
                    continue;
                }
                TaskStatus::Doing => {}
            }
            let Some(head) = op.tasks.front() else {
                tracing::debug!(op_id = *op_id, "operation finished");
                continue;
            };
            match tablets.get(&head.endpoint) {
                Some(info) => {
                    submissions.push((info.client.clone(), head.clone()));
                    run_ops.push(*op_id);
                }
                None => {
                    tracing::warn!(op_id = *op_id, endpoint = %head.endpoint, "no client for task target");
                }
            }
        }
    }
    for (client, task) in submissions {
        tokio::spawn(async move {
            execute_task(client, task).await;
        });
    }
    run_ops
}

/// Perform the tablet-side RPC of one task. The outcome is learned through
/// the status poller, not from this call.
async fn execute_task(client: Arc<dyn TabletClient>, task: Task) {
    let result = match &task.kind {
        TaskKind::MakeSnapshot { tid, pid } => client.make_snapshot(*tid, *pid).await,
        TaskKind::CreateTable {
            name,
            tid,
            pid,
            ttl,
            is_leader,
            replicas,
        } => {
            client
                .create_table(name, *tid, *pid, *ttl, *is_leader, replicas)
                .await
        }
    };
    match result {
        Ok(true) => {
            tracing::debug!(op_id = task.op_id, endpoint = %task.endpoint, "task rpc accepted")
        }
        Ok(false) => {
            tracing::warn!(op_id = task.op_id, endpoint = %task.endpoint, "task rpc rejected")
        }
        Err(err) => {
            tracing::debug!(op_id = task.op_id, endpoint = %task.endpoint, error = %err, "task rpc failed")
        }
    }
}

/// Rewrite the durable record of each listed op with its remaining tasks.
pub(crate) async fn publish_op_status(ns: &NameServer, run_ops: &[u64]) {
    for op_id in run_ops {
        let record = {
            let inner = ns.lock_inner();
            match inner.task_map.get(op_id) {
                Some(op) => op.to_record(),
                None => {
                    tracing::warn!(op_id = *op_id, "op vanished before publish");
                    continue;
                }
            }
        };
        let value = match serde_json::to_vec(&record) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(op_id = *op_id, error = %err, "failed to encode op record");
                continue;
            }
        };
        if let Err(err) = ns.coord.set(&ns.paths.op_node(*op_id), &value).await {
            tracing::warn!(op_id = *op_id, error = %err, "failed to publish op record");
        }
    }
}

/// Delete finished ops: every healthy tablet must acknowledge before the
/// durable record and the in-memory entry go away. Any failure leaves the
/// op for the next cycle.
pub(crate) async fn reap_finished_ops(ns: &NameServer) {
    let (done_ops, clients) = {
        let inner = ns.lock_inner();
        let done: Vec<u64> = inner
            .task_map
            .iter()
            .filter(|(_, op)| op.tasks.is_empty())
            .map(|(id, _)| *id)
            .collect();
        if done.is_empty() {
            return;
        }
        (done, registry::healthy_clients(&inner.tablets))
    };

    let mut has_failed = false;
    for client in clients {
        match client.delete_op_task(&done_ops).await {
            Ok(true) => {
                tracing::debug!(endpoint = %client.endpoint(), "tablet acknowledged op deletion")
            }
            Ok(false) => {
                tracing::warn!(endpoint = %client.endpoint(), "tablet refused op deletion");
                has_failed = true;
            }
            Err(err) => {
                tracing::warn!(endpoint = %client.endpoint(), error = %err, "op deletion rpc failed");
                has_failed = true;
            }
        }
    }
    if has_failed {
        return;
    }

    for op_id in done_ops {
        match ns.coord.delete(&ns.paths.op_node(op_id)).await {
            Ok(()) | Err(Error::NodeNotFound(_)) => {
                ns.lock_inner().task_map.remove(&op_id);
                tracing::info!(op_id, "operation reaped");
            }
            Err(err) => {
                tracing::warn!(op_id, error = %err, "failed to delete op node");
            }
        }
    }
}
