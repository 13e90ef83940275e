//! Configuration for the name server

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Name server configuration.
///
/// Durable state lives in the coordination service under `coord_root_path`;
/// every instance of a cluster must point at the same cluster and root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameServerConfig {
    /// Advertised endpoint of this process (also the lock identity)
    pub endpoint: String,

    /// Bind address for the admin gRPC API
    pub listen_addr: SocketAddr,

    /// Bind address for the admin HTTP API
    pub http_addr: SocketAddr,

    /// Coordination service cluster address
    pub coord_cluster: String,

    /// Root path of this cluster's durable tree
    #[serde(default = "default_root_path")]
    pub coord_root_path: String,

    /// Coordination session timeout
    #[serde(default = "default_session_timeout")]
    pub coord_session_timeout_ms: u64,

    /// Period of the session keepalive check
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_check_interval_ms: u64,

    /// Period of the tablet task-status poller
    #[serde(default = "default_task_status_interval")]
    pub task_status_interval_ms: u64,
}

fn default_root_path() -> String {
    "/tablens".to_string()
}
fn default_session_timeout() -> u64 {
    10_000
}
fn default_keepalive_interval() -> u64 {
    15_000
}
fn default_task_status_interval() -> u64 {
    2_000
}

impl Default for NameServerConfig {
    fn default() -> Self {
        Self {
            endpoint: "127.0.0.1:9527".to_string(),
            listen_addr: "0.0.0.0:9527".parse().unwrap(),
            http_addr: "0.0.0.0:9528".parse().unwrap(),
            coord_cluster: String::new(),
            coord_root_path: default_root_path(),
            coord_session_timeout_ms: default_session_timeout(),
            keepalive_check_interval_ms: default_keepalive_interval(),
            task_status_interval_ms: default_task_status_interval(),
        }
    }
}

impl NameServerConfig {
    /// Load from a JSON file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: NameServerConfig = serde_json::from_str(&content)
            .map_err(|e| crate::Error::InvalidConfig(format!("failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Save to a JSON file
    pub fn to_file(&self, path: impl AsRef<std::path::Path>) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.endpoint.is_empty() {
            return Err(crate::Error::InvalidConfig("endpoint is required".into()));
        }
        if self.coord_root_path.is_empty() || !self.coord_root_path.starts_with('/') {
            return Err(crate::Error::InvalidConfig(
                "coord_root_path must be an absolute path".into(),
            ));
        }
        if self.coord_root_path.ends_with('/') {
            return Err(crate::Error::InvalidConfig(
                "coord_root_path must not end with '/'".into(),
            ));
        }
        if self.task_status_interval_ms == 0 {
            return Err(crate::Error::InvalidConfig(
                "task_status_interval_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}
