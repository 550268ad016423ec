//! cri-hostports - host port forwarding for CRI runtimes
//!
//! This binary runs on each node next to the container runtime and keeps
//! an nftables DNAT table in sync with the host ports declared by running
//! containers.

use anyhow::{Context, Result};
use clap::Parser;
use hostports_lib::{
    api,
    health::HealthRegistry,
    nft::NftApplier,
    observability::{AgentMetrics, StructuredLogger},
    runtime::{CriConnectorBuilder, DEFAULT_RUNTIME_ENDPOINT, RUNTIME_ENDPOINT_ENV},
    ReconcilerBuilder,
};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Host port forwarding for CRI container runtimes
#[derive(Parser, Debug)]
#[command(name = "cri-hostports", version, about)]
struct Args {
    /// CRI runtime endpoint (unix:///path or tcp://host:port)
    #[arg(long, env = RUNTIME_ENDPOINT_ENV, default_value = DEFAULT_RUNTIME_ENDPOINT)]
    runtime_endpoint: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let args = Args::parse();
    let config = config::AgentConfig::load()?;
    info!(node_name = %config.node_name, "Agent configured");

    let logger = StructuredLogger::new(&config.node_name);
    logger.log_startup(AGENT_VERSION, &args.runtime_endpoint);

    let health_registry = HealthRegistry::new();
    let metrics = AgentMetrics::new();

    // An unusable endpoint will never connect; refuse to start.
    let connector = CriConnectorBuilder::new()
        .endpoint(&args.runtime_endpoint)
        .connect_timeout(config.connect_timeout())
        .build()
        .context("Invalid runtime endpoint")?;

    let reconciler = ReconcilerBuilder::new()
        .connector(Arc::new(connector))
        .applier(Arc::new(NftApplier::new(&config.nft_binary)))
        .interval(config.sync_interval())
        .cycle_timeout(config.cycle_timeout())
        .health(health_registry.clone())
        .node_name(&config.node_name)
        .build()?;

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let api_handle = config.api_port.map(|port| {
        let state = Arc::new(api::AppState::new(health_registry.clone(), metrics.clone()));
        let shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = api::serve(port, state, shutdown).await {
                error!(error = %e, "API server failed");
            }
        })
    });

    let mut reconciler_handle = tokio::spawn(reconciler.run(shutdown_tx.subscribe()));

    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    let finished = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            logger.log_shutdown("SIGINT received");
            None
        }
        _ = sigterm.recv() => {
            logger.log_shutdown("SIGTERM received");
            None
        }
        joined = &mut reconciler_handle => Some(joined),
    };

    // Stops the API server and the reconciliation loop.
    let _ = shutdown_tx.send(());
    let joined = match finished {
        Some(joined) => joined,
        None => reconciler_handle.await,
    };

    if let Some(handle) = api_handle {
        let _ = handle.await;
    }

    let result = joined.context("Reconciler task panicked")?;
    if let Err(e) = &result {
        logger.log_shutdown(&e.to_string());
    }
    result.map_err(anyhow::Error::from)
}
