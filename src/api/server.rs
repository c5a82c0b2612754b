//! API Server
//!
//! Serves the REST router until shutdown is requested.

use super::rest::RestRouter;
use crate::engine::ControllerRef;
use crate::error::{Error, Result};
use crate::inventory::InventoryStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

// =============================================================================
// Server Configuration
// =============================================================================

/// Configuration for the API server
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// REST API bind address
    pub rest_addr: SocketAddr,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            rest_addr: SocketAddr::from(([0, 0, 0, 0], 8090)),
        }
    }
}

// =============================================================================
// API Server
// =============================================================================

pub struct ApiServer {
    config: ApiServerConfig,
    controllers: Vec<ControllerRef>,
    inventory: Option<Arc<InventoryStore>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            controllers: Vec::new(),
            inventory: None,
            shutdown_tx,
        }
    }

    pub fn with_controller(mut self, controller: ControllerRef) -> Self {
        self.controllers.push(controller);
        self
    }

    pub fn with_inventory(mut self, inventory: Arc<InventoryStore>) -> Self {
        self.inventory = Some(inventory);
        self
    }

    fn router(&self) -> RestRouter {
        let router = self
            .controllers
            .iter()
            .cloned()
            .fold(RestRouter::new(), RestRouter::with_controller);
        match &self.inventory {
            Some(store) => router.with_inventory(store.clone()),
            None => router,
        }
    }

    /// Run the API server until [`shutdown`](Self::shutdown) is called
    pub async fn run(&self) -> Result<()> {
        info!(
            rest = %self.config.rest_addr,
            controllers = self.controllers.len(),
            "Starting API server"
        );

        let handle = tokio::spawn(run_rest_server(
            self.config.rest_addr,
            self.router(),
            self.shutdown_tx.subscribe(),
        ));

        match handle.await {
            Ok(result) => result,
            Err(e) => {
                error!("REST server task failed: {:?}", e);
                Err(Error::Internal(format!("REST server task failed: {}", e)))
            }
        }
    }

    /// Trigger graceful shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Run the REST API server
async fn run_rest_server(
    addr: SocketAddr,
    router: RestRouter,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    let app = router.build();

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind REST server: {}", e)))?;
    info!("REST API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("REST server shutting down");
        })
        .await
        .map_err(|e| Error::Internal(format!("REST server error: {}", e)))?;

    Ok(())
}
