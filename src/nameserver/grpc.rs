//! Name server gRPC service
//!
//! Admin replies use `(code, msg)` pairs: 0/"ok" on success, -1 with a
//! fixed message on failure. The message strings are wire-visible behavior
//! (admin tooling matches on them, misspellings included) and must not be
//! reworded.

use std::sync::Arc;

use tonic::{Request, Response, Status};

use crate::common::Error;
use crate::nameserver::catalog::{TableMeta, TablePartition};
use crate::nameserver::core::NameServer;
use crate::proto;
use crate::proto::name_server_server::{NameServer as NameServerRpc, NameServerServer};

pub struct NameServerGrpcService {
    ns: Arc<NameServer>,
}

impl NameServerGrpcService {
    pub fn new(ns: Arc<NameServer>) -> Self {
        Self { ns }
    }

    pub fn into_server(self) -> NameServerServer<Self> {
        NameServerServer::new(self)
    }
}

fn reply_msg(err: &Error) -> String {
    match err {
        Error::NotLeader => "nameserver is not leader".to_string(),
        Error::TableNotFound(_) => "get table info failed".to_string(),
        Error::PartitionNotFound(_) => "partition not exisit".to_string(),
        Error::TabletOffline(_) => "tablet is not online".to_string(),
        Error::TableExists(_) => "table is already exisit!".to_string(),
        // coordination failures carry the step that failed
        Error::Coordination(msg) => msg.clone(),
        other => other.to_string(),
    }
}

fn ok_response() -> proto::GeneralResponse {
    proto::GeneralResponse {
        code: 0,
        msg: "ok".to_string(),
    }
}

fn err_response(err: &Error) -> proto::GeneralResponse {
    proto::GeneralResponse {
        code: -1,
        msg: reply_msg(err),
    }
}

fn table_meta_from_proto(meta: proto::TableMeta) -> TableMeta {
    TableMeta {
        name: meta.name,
        tid: meta.tid,
        ttl: meta.ttl,
        partitions: meta
            .table_partition
            .into_iter()
            .map(|p| TablePartition {
                pid: p.pid,
                endpoint: p.endpoint,
                is_leader: p.is_leader,
            })
            .collect(),
    }
}

#[tonic::async_trait]
impl NameServerRpc for NameServerGrpcService {
    async fn show_tablet(
        &self,
        _req: Request<proto::ShowTabletRequest>,
    ) -> Result<Response<proto::ShowTabletResponse>, Status> {
        let tablets = self
            .ns
            .show_tablet()
            .into_iter()
            .map(|row| proto::TabletStatus {
                endpoint: row.endpoint,
                state: row.state.to_string(),
                age: row.age_ms,
            })
            .collect();
        Ok(Response::new(proto::ShowTabletResponse {
            tablets,
            code: 0,
            msg: "ok".to_string(),
        }))
    }

    async fn create_table(
        &self,
        req: Request<proto::CreateTableRequest>,
    ) -> Result<Response<proto::GeneralResponse>, Status> {
        let Some(meta) = req.into_inner().table_meta else {
            return Ok(Response::new(proto::GeneralResponse {
                code: -1,
                msg: "table meta is missing".to_string(),
            }));
        };
        let response = match self.ns.create_table(table_meta_from_proto(meta)).await {
            Ok(()) => ok_response(),
            Err(err) => {
                tracing::warn!(error = %err, "create table rejected");
                err_response(&err)
            }
        };
        Ok(Response::new(response))
    }

    async fn make_snapshot(
        &self,
        req: Request<proto::MakeSnapshotRequest>,
    ) -> Result<Response<proto::GeneralResponse>, Status> {
        let req = req.into_inner();
        let response = match self.ns.make_snapshot(&req.name, req.pid).await {
            Ok(_op_id) => ok_response(),
            Err(err) => {
                tracing::warn!(table = %req.name, pid = req.pid, error = %err, "make snapshot rejected");
                err_response(&err)
            }
        };
        Ok(Response::new(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_messages_are_stable() {
        assert_eq!(reply_msg(&Error::NotLeader), "nameserver is not leader");
        assert_eq!(
            reply_msg(&Error::TableNotFound("t1".into())),
            "get table info failed"
        );
        assert_eq!(reply_msg(&Error::PartitionNotFound(0)), "partition not exisit");
        assert_eq!(
            reply_msg(&Error::TabletOffline("a:9090".into())),
            "tablet is not online"
        );
        assert_eq!(
            reply_msg(&Error::TableExists("t1".into())),
            "table is already exisit!"
        );
        assert_eq!(
            reply_msg(&Error::Coordination("set op index node failed".into())),
            "set op index node failed"
        );
    }

    #[test]
    fn test_table_meta_conversion() {
        let meta = table_meta_from_proto(proto::TableMeta {
            name: "t1".into(),
            tid: 0,
            ttl: 144_000,
            table_partition: vec![proto::TablePartition {
                pid: 0,
                endpoint: "a:9090".into(),
                is_leader: true,
            }],
        });
        assert_eq!(meta.name, "t1");
        assert_eq!(meta.ttl, 144_000);
        assert_eq!(meta.partitions.len(), 1);
        assert!(meta.partitions[0].is_leader);
    }
}
