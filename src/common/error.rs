//! Error types for tablens

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === Leadership ===
    #[error("nameserver is not leader")]
    NotLeader,

    // === Catalog ===
    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("partition not found: {0}")]
    PartitionNotFound(u32),

    #[error("table already exists: {0}")]
    TableExists(String),

    #[error("invalid table meta: {0}")]
    InvalidMeta(String),

    // === Registry ===
    #[error("tablet is not online: {0}")]
    TabletOffline(String),

    // === Coordination service ===
    #[error("node already exists: {0}")]
    NodeExists(String),

    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("coordination session lost")]
    SessionLost,

    #[error("coordination error: {0}")]
    Coordination(String),

    // === Network ===
    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::Status),

    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    // === Config ===
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Is this a retryable error?
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::SessionLost | Error::Coordination(_) | Error::Grpc(_) | Error::Transport(_)
        )
    }

    /// Convert to gRPC status for RPC responses
    pub fn to_grpc_status(&self) -> tonic::Status {
        use tonic::Code;
        match self {
            Error::NotLeader => tonic::Status::new(Code::FailedPrecondition, self.to_string()),
            Error::TableNotFound(_) | Error::PartitionNotFound(_) | Error::NodeNotFound(_) => {
                tonic::Status::new(Code::NotFound, self.to_string())
            }
            Error::TableExists(_) | Error::NodeExists(_) => {
                tonic::Status::new(Code::AlreadyExists, self.to_string())
            }
            Error::TabletOffline(_) => tonic::Status::new(Code::Unavailable, self.to_string()),
            Error::InvalidConfig(_) | Error::InvalidMeta(_) => {
                tonic::Status::new(Code::InvalidArgument, self.to_string())
            }
            Error::Grpc(status) => status.clone(),
            _ => tonic::Status::new(Code::Internal, self.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Internal(format!("serialization failed: {}", e))
    }
}
