//! Name server bootstrap

use std::sync::Arc;
use std::time::Duration;

use crate::common::{Error, NameServerConfig, Result};
use crate::coord::{spawn_lock, CoordClient, CoordPaths, MemoryCoordination};
use crate::nameserver::core::{LeaderGate, NameServer};
use crate::nameserver::grpc::NameServerGrpcService;
use crate::nameserver::http::{create_router, AdminState};
use crate::nameserver::tablet_client::GrpcTabletClientFactory;

pub struct NameServerRunner {
    config: NameServerConfig,
}

impl NameServerRunner {
    pub fn new(config: NameServerConfig) -> Self {
        Self { config }
    }

    pub async fn serve(self) -> Result<()> {
        self.config.validate()?;
        if !self.config.coord_cluster.is_empty() {
            return Err(Error::InvalidConfig(
                "external coordination clusters are not supported yet; \
                 leave coord_cluster empty to run the embedded store"
                    .into(),
            ));
        }

        tracing::info!("Starting name server: {}", self.config.endpoint);
        tracing::info!("  gRPC API: {}", self.config.listen_addr);
        tracing::info!("  HTTP API: {}", self.config.http_addr);
        tracing::info!("  Coordination root: {}", self.config.coord_root_path);

        // standalone mode: the coordination tree lives in this process
        let coordination = MemoryCoordination::new();
        let coord: Arc<dyn CoordClient> = Arc::new(coordination.client());

        let factory = Arc::new(GrpcTabletClientFactory);
        let ns = Arc::new(NameServer::new(self.config.clone(), coord.clone(), factory));

        let _keepalive = spawn_keepalive(coord.clone(), self.config.keepalive_check_interval_ms);
        let _lock = spawn_lock(
            coord.clone(),
            CoordPaths::new(&self.config.coord_root_path),
            self.config.endpoint.clone(),
            LeaderGate::new(ns.clone()),
        );

        let grpc_service = NameServerGrpcService::new(ns.clone());
        let grpc_server = tonic::transport::Server::builder()
            .add_service(grpc_service.into_server())
            .serve(self.config.listen_addr);

        let http_router = create_router(AdminState { ns: ns.clone() });
        let http_listener = tokio::net::TcpListener::bind(self.config.http_addr).await?;
        let http_server = axum::serve(http_listener, http_router);

        tracing::info!("✓ Name server ready");

        tokio::select! {
            res = grpc_server => {
                if let Err(e) = res {
                    tracing::error!("gRPC server error: {}", e);
                }
            }
            res = http_server => {
                if let Err(e) = res {
                    tracing::error!("HTTP server error: {}", e);
                }
            }
        }

        Ok(())
    }
}

/// Re-establish the coordination session whenever it drops. Ephemeral nodes
/// and watches of the old session are gone after a reconnect; the lock task
/// recontends and a re-elected leader re-arms its watches during recovery.
pub fn spawn_keepalive(
    coord: Arc<dyn CoordClient>,
    check_interval_ms: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(check_interval_ms.max(1)));
        loop {
            ticker.tick().await;
            if !coord.is_connected() {
                match coord.reconnect().await {
                    Ok(()) => tracing::info!("coordination session re-established"),
                    Err(err) => tracing::warn!(error = %err, "coordination reconnect failed"),
                }
            }
        }
    })
}
