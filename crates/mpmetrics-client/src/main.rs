//! mpmetrics exporter
//!
//! Sidecar for pre-fork servers:
//! - Reset the shared shard directory once, under the setup lock
//! - Serve the merged view of every worker's shards on /metrics
//! - Stop on ctrl-c
//!
//! Config path: first argument, else `$MPMETRICS_CONFIG`, else `mpmetrics.yaml`.

use tracing_subscriber::{fmt, EnvFilter};

use mpmetrics_client::{config, MetricsClient};
use mpmetrics_core::Result;

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, kind = e.kind().as_str(), "mpmetrics-exporter failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("MPMETRICS_CONFIG").ok())
        .unwrap_or_else(|| "mpmetrics.yaml".to_string());
    let cfg = config::load_from_file(&path)?;

    let client = MetricsClient::new(&cfg.metrics)?;
    let server = client
        .start_http_server(cfg.exporter.port, &cfg.exporter.addr)
        .await?;
    tracing::info!(config = %path, addr = %server.local_addr(), "mpmetrics-exporter started");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c; shutting down");
    }
    server.shutdown().await;
    tracing::info!("mpmetrics-exporter stopped");
    Ok(())
}
