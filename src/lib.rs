//! # tablens
//!
//! The name server of a distributed table store:
//! - leader election over a coordination service (one active leader, any
//!   number of standbys)
//! - tablet fleet tracking via membership watches
//! - authoritative table catalog with durable id assignment
//! - a durable operation log whose multi-step tasks are driven against
//!   tablets until fully acknowledged
//!
//! ## Architecture
//!
//! ```text
//!                ┌──────────────────────────────────┐
//!                │        Coordination service      │
//!                │  (leader lock, catalog, op log)  │
//!                └───────────────┬──────────────────┘
//!                                │ watches + durable state
//!            ┌───────────────────┴───────────────────┐
//!            │              Name server              │
//!            │  leader: drives ops, mutates catalog  │
//!            │  standby: waits on the lock           │
//!            └───────┬─────────────┬─────────────────┘
//!                    │ gRPC        │ gRPC
//!              ┌─────▼─────┐ ┌─────▼─────┐
//!              │ Tablet 1  │ │ Tablet 2  │  ... storage nodes serving
//!              └───────────┘ └───────────┘      table partitions
//! ```
//!
//! ## Usage
//!
//! ```bash
//! tablens-nameserver serve \
//!   --endpoint 10.0.0.5:9527 \
//!   --listen 0.0.0.0:9527 \
//!   --http 0.0.0.0:9528 \
//!   --root /tablens
//! ```

pub mod common;
pub mod coord;
pub mod nameserver;

// Re-export commonly used types
pub use common::{Error, NameServerConfig, Result};
pub use nameserver::{NameServer, NameServerRunner};

// Generated protobuf code
pub mod proto {
    tonic::include_proto!("tablens");
}

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
