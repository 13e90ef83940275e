//! Name server implementation
//!
//! The name server is the control plane of the cluster:
//! - leader election through the distributed lock
//! - tablet membership tracking driven by coordination-service watches
//! - the authoritative table catalog
//! - a durable log of multi-step admin operations driven against tablets

pub mod catalog;
pub mod core;
pub mod grpc;
pub mod http;
pub mod oplog;
pub mod registry;
pub mod server;
pub mod tablet_client;
pub(crate) mod tasks;

pub use self::core::{LeaderGate, NameServer, StatusSummary};
pub use self::server::NameServerRunner;
