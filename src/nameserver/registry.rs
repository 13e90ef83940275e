//! Tablet registry
//!
//! Tracks every tablet endpoint ever observed in the membership directory.
//! Endpoints oscillate between Healthy and Offline with membership changes
//! but are never removed, so in-flight operations keep their history across
//! flapping.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::common::timestamp_now_millis;
use crate::nameserver::tablet_client::{TabletClient, TabletClientFactory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TabletState {
    Healthy,
    Offline,
}

impl TabletState {
    pub fn is_healthy(&self) -> bool {
        matches!(self, TabletState::Healthy)
    }
}

impl std::fmt::Display for TabletState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TabletState::Healthy => write!(f, "healthy"),
            TabletState::Offline => write!(f, "offline"),
        }
    }
}

/// Everything the name server knows about one tablet.
pub struct TabletInfo {
    pub state: TabletState,
    /// Millisecond timestamp of the last Offline -> Healthy transition.
    pub ctime_ms: u64,
    pub client: Arc<dyn TabletClient>,
}

/// One row of a `ShowTablet` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabletRow {
    pub endpoint: String,
    pub state: TabletState,
    pub age_ms: u64,
}

/// Fold a full membership snapshot into the registry. The caller holds the
/// global lock; client construction is synchronous (lazy channels).
pub fn update_tablets(
    tablets: &mut HashMap<String, TabletInfo>,
    endpoints: &[String],
    factory: &dyn TabletClientFactory,
) {
    for endpoint in endpoints {
        match tablets.get_mut(endpoint) {
            None => {
                let client = match factory.client(endpoint) {
                    Ok(client) => client,
                    Err(err) => {
                        // retried on the next membership change
                        tracing::warn!(endpoint = %endpoint, error = %err, "failed to build tablet client");
                        continue;
                    }
                };
                tracing::info!(endpoint = %endpoint, "healthy tablet registered");
                tablets.insert(
                    endpoint.clone(),
                    TabletInfo {
                        state: TabletState::Healthy,
                        ctime_ms: timestamp_now_millis(),
                        client,
                    },
                );
            }
            Some(info) => {
                if info.state != TabletState::Healthy {
                    tracing::info!(endpoint = %endpoint, "tablet back online");
                    info.ctime_ms = timestamp_now_millis();
                }
                info.state = TabletState::Healthy;
            }
        }
    }
    for (endpoint, info) in tablets.iter_mut() {
        if !endpoints.contains(endpoint) && info.state == TabletState::Healthy {
            tracing::info!(endpoint = %endpoint, "tablet offline");
            info.state = TabletState::Offline;
        }
    }
}

/// Snapshot the registry into reply rows.
pub fn show_tablet(tablets: &HashMap<String, TabletInfo>) -> Vec<TabletRow> {
    let now = timestamp_now_millis();
    let mut rows: Vec<TabletRow> = tablets
        .iter()
        .map(|(endpoint, info)| TabletRow {
            endpoint: endpoint.clone(),
            state: info.state,
            age_ms: now.saturating_sub(info.ctime_ms),
        })
        .collect();
    rows.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
    rows
}

/// Clients of every healthy tablet, for off-lock RPC fan-out.
pub fn healthy_clients(tablets: &HashMap<String, TabletInfo>) -> Vec<Arc<dyn TabletClient>> {
    tablets
        .values()
        .filter(|info| info.state.is_healthy())
        .map(|info| info.client.clone())
        .collect()
}
