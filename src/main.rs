mod backend;
mod config;
mod lobby;
mod metrics;
mod net;
mod util;
mod world;

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::backend::{DevTokenVerifier, InMemoryStore};
use crate::config::{ServerConfig, SimulationConfig};
use crate::lobby::manager::LobbyService;
use crate::metrics::Metrics;
use crate::net::transport::Transport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();

    info!("Frontier World Server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::load_or_default();
    config.validate().map_err(anyhow::Error::msg)?;
    let sim_config = SimulationConfig::load_or_default();
    info!(
        "Configuration loaded: {}:{}, max_lobbies={}, seed={}",
        config.bind_address, config.port, config.max_lobbies, sim_config.world_seed
    );

    let metrics = Arc::new(Metrics::new());
    let metrics_port = config.metrics_port;
    let metrics_clone = metrics.clone();
    tokio::spawn(async move {
        if let Err(e) = metrics::start_metrics_server(metrics_clone, metrics_port).await {
            error!("Metrics server error: {}", e);
        }
    });

    // External collaborators; swap for real backends at the trait seams
    let store = Arc::new(InMemoryStore::new());
    let verifier = Arc::new(DevTokenVerifier);

    let service = Arc::new(LobbyService::new(
        config.clone(),
        sim_config,
        metrics.clone(),
        store,
    ));

    let transport = Transport::bind(&config, service.clone(), verifier, metrics.clone()).await?;
    info!("Server ready on {}:{}", config.bind_address, config.port);

    let shutdown = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Shutdown signal received");
    };

    tokio::select! {
        result = transport.run() => {
            if let Err(e) = result {
                error!("Transport error: {}", e);
            }
        }
        _ = shutdown => {
            info!("Shutting down...");
        }
    }

    service.shutdown_all().await;
    info!("Server stopped");

    Ok(())
}
