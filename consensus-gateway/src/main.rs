//! Consensus gateway binary.
//!
//! Provider settings come from the process environment (see
//! [`consensus_gateway::config`]); the flags below only configure the
//! listener and logging.

use clap::Parser;
use consensus_gateway::{config::GatewayConfig, server::create_server};
use std::net::SocketAddr;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host address to bind the server to.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port number for the HTTP server.
    #[arg(short, long, default_value_t = 3000)]
    port: u16,

    /// Logging level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(args.log_level.as_str())
        .init();

    let config = GatewayConfig::from_env()?;
    tracing::info!(
        providers = config.providers.len(),
        min_providers = config.min_providers,
        "loaded configuration"
    );

    let app = create_server(config).await?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "consensus gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to install shutdown handler");
        return;
    }
    tracing::info!("shutdown signal received");
}
