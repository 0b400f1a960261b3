use anyhow::{Result, anyhow};
use std::sync::Arc;
use tokio::{signal, sync::broadcast};
use tracing::{error, info};
use tracing_subscriber::{self, EnvFilter};
use url::Url;

use transfer_indexer::indexer::{Pipeline, rpc::AlloyNode};
use transfer_indexer::metrics::Metrics;
use transfer_indexer::storage::{Sink, checkpoint::CheckpointStore};
use transfer_indexer::utils::{config_file_path, load_config};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    println!();
    info!("=========================== INITIALIZING ===========================");

    // Load config
    let config = match load_config(config_file_path()) {
        Ok(config) => {
            info!("Config loaded successfully");
            config
        }
        Err(e) => {
            error!("Failed to load config: {:#}", e);
            return Err(e);
        }
    };

    let rpc_url: Url = config.rpc_url.parse()?;
    if !matches!(rpc_url.scheme(), "ws" | "wss") {
        return Err(anyhow!(
            "RPC URL must be a WebSocket endpoint, got scheme '{}'",
            rpc_url.scheme()
        ));
    }
    info!("RPC URL: {}", rpc_url);

    // Initialize optional metrics
    let metrics = if config.metrics.enabled {
        let metrics = Arc::new(Metrics::new(config.chain_name.clone())?);
        metrics
            .start_metrics_server(&config.metrics.address, config.metrics.port)
            .await?;
        Some(metrics)
    } else {
        info!("Metrics are disabled");
        None
    };

    let node = AlloyNode::connect(rpc_url.as_str(), config.retry.clone(), metrics.clone()).await?;
    let sink = Sink::from_config(&config.sink).await?;
    let checkpoint = CheckpointStore::open(&config.checkpoint_path)?;

    // Ctrl+C stops ingestion; queued blocks are drained before exit
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if let Ok(()) = signal::ctrl_c().await {
            info!("Received Ctrl+C signal, initiating shutdown...");
            let _ = shutdown_tx.send(());
        }
    });

    let pipeline = Pipeline::new(Arc::new(config), Arc::new(node), sink, checkpoint, metrics);

    println!();
    info!("========================= STARTING INDEXER =========================");

    pipeline.run(shutdown_rx).await?;

    Ok(())
}
