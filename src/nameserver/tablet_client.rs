//! RPC client for the tablet surface the name server consumes
//!
//! [`TabletClient`] is the seam the task engine drives operations through;
//! the gRPC implementation wraps the generated tonic client with a lazy
//! channel so registry updates never block on connection establishment.

use std::sync::Arc;

use async_trait::async_trait;
use tonic::transport::Channel;

use crate::common::Result;
use crate::nameserver::oplog::{TaskStatus, TaskType};
use crate::proto;

/// One (op, task) status row reported by a tablet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStatusEntry {
    pub op_id: u64,
    pub task_type: TaskType,
    pub status: TaskStatus,
}

/// The tablet RPC surface consumed by the name server.
#[async_trait]
pub trait TabletClient: Send + Sync {
    fn endpoint(&self) -> &str;

    async fn create_table(
        &self,
        name: &str,
        tid: u32,
        pid: u32,
        ttl: u64,
        is_leader: bool,
        replicas: &[String],
    ) -> Result<bool>;

    async fn make_snapshot(&self, tid: u32, pid: u32) -> Result<bool>;

    /// Cumulative status of every op the tablet knows about.
    async fn get_task_status(&self) -> Result<Vec<TaskStatusEntry>>;

    /// Forget finished ops. All-or-nothing per call.
    async fn delete_op_task(&self, op_ids: &[u64]) -> Result<bool>;
}

/// Hands out client handles for newly discovered tablet endpoints.
///
/// Registry updates run under the global lock, so construction must be
/// synchronous; gRPC handles connect lazily on first use.
pub trait TabletClientFactory: Send + Sync {
    fn client(&self, endpoint: &str) -> Result<Arc<dyn TabletClient>>;
}

/// gRPC-backed tablet client.
pub struct GrpcTabletClient {
    endpoint: String,
    client: proto::tablet_client::TabletClient<Channel>,
}

impl GrpcTabletClient {
    pub fn lazy(endpoint: &str) -> Result<Self> {
        let uri = format!("http://{}", endpoint);
        let channel = tonic::transport::Endpoint::from_shared(uri)?.connect_lazy();
        Ok(Self {
            endpoint: endpoint.to_string(),
            client: proto::tablet_client::TabletClient::new(channel),
        })
    }
}

#[async_trait]
impl TabletClient for GrpcTabletClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn create_table(
        &self,
        name: &str,
        tid: u32,
        pid: u32,
        ttl: u64,
        is_leader: bool,
        replicas: &[String],
    ) -> Result<bool> {
        let mut client = self.client.clone();
        let response = client
            .create_table(proto::TabletCreateTableRequest {
                name: name.to_string(),
                tid,
                pid,
                ttl,
                is_leader,
                replicas: replicas.to_vec(),
            })
            .await?;
        Ok(response.into_inner().ok)
    }

    async fn make_snapshot(&self, tid: u32, pid: u32) -> Result<bool> {
        let mut client = self.client.clone();
        let response = client
            .make_snapshot(proto::TabletMakeSnapshotRequest { tid, pid })
            .await?;
        Ok(response.into_inner().ok)
    }

    async fn get_task_status(&self) -> Result<Vec<TaskStatusEntry>> {
        let mut client = self.client.clone();
        let response = client
            .get_task_status(proto::GetTaskStatusRequest {})
            .await?;
        let mut entries = Vec::new();
        for info in response.into_inner().tasks {
            // a report from a newer or older tablet build may carry kinds
            // we do not know; skip them rather than poisoning the poll
            let task_type = match info.task_kind.parse::<TaskType>() {
                Ok(ty) => ty,
                Err(_) => {
                    tracing::warn!(task_kind = %info.task_kind, "unknown task kind in status report");
                    continue;
                }
            };
            let status = match info.status.parse::<TaskStatus>() {
                Ok(status) => status,
                Err(_) => {
                    tracing::warn!(status = %info.status, "unknown task status in status report");
                    continue;
                }
            };
            entries.push(TaskStatusEntry {
                op_id: info.op_id,
                task_type,
                status,
            });
        }
        Ok(entries)
    }

    async fn delete_op_task(&self, op_ids: &[u64]) -> Result<bool> {
        let mut client = self.client.clone();
        let response = client
            .delete_op_task(proto::DeleteOpTaskRequest {
                op_id: op_ids.to_vec(),
            })
            .await?;
        Ok(response.into_inner().ok)
    }
}

/// Factory for [`GrpcTabletClient`] handles.
#[derive(Default)]
pub struct GrpcTabletClientFactory;

impl TabletClientFactory for GrpcTabletClientFactory {
    fn client(&self, endpoint: &str) -> Result<Arc<dyn TabletClient>> {
        Ok(Arc::new(GrpcTabletClient::lazy(endpoint)?))
    }
}
