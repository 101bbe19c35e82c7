//! LogScope server binary.
//!
//! Collects structured logs over HTTP, serves search queries and streams new
//! entries to WebSocket subscribers.

use clap::Parser;
use logscope_server::{Cli, LogScopeServer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = cli.into_config();
    let addr = config.bind_addr;
    info!("Starting LogScope on {}", addr);
    info!("  Collect endpoint:   http://{}/api/logs/collect", addr);
    info!("  WebSocket endpoint: ws://{}/ws", addr);
    if config.api_key.is_none() {
        info!("  API key not set, /api routes are open");
    }

    let server = LogScopeServer::new(config);
    server
        .serve_with_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
            }
        })
        .await?;

    Ok(())
}
