//! Admin HTTP surface
//!
//! A small read-only dashboard: liveness plus a status summary. Mutating
//! admin actions go through the gRPC surface.

use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, Router};
use serde_json::json;

use crate::nameserver::core::NameServer;

/// Shared state for HTTP handlers.
#[derive(Clone)]
pub struct AdminState {
    pub ns: Arc<NameServer>,
}

async fn health() -> &'static str {
    "OK"
}

async fn admin_status(State(state): State<AdminState>) -> impl IntoResponse {
    let summary = state.ns.status_summary();
    axum::Json(json!({
        "role": if summary.is_leader { "leader" } else { "standby" },
        "is_leader": summary.is_leader,
        "endpoint": summary.endpoint,
        "nb_tablets": summary.nb_tablets,
        "nb_healthy_tablets": summary.nb_healthy_tablets,
        "nb_tables": summary.nb_tables,
        "nb_ops": summary.nb_ops,
    }))
}

/// Creates the HTTP router with all admin endpoints.
pub fn create_router(state: AdminState) -> Router {
    Router::new()
        .route("/health", axum::routing::get(health))
        .route("/admin/status", axum::routing::get(admin_status))
        .with_state(state)
}
