//! # relay
//!
//! Starts the failover router.
//!
//! ## Usage
//!
//! ```bash
//! # Configure through the environment (or a .env file outside production)
//! RPCs=https://rpc-a.example,https://rpc-b.example \
//! FALLBACK_RPCs=https://fallback.example \
//! PORT=8080 \
//! ERROR_TIME_TO_LIVE_MINUTES=1 \
//! SLACK_WEBHOOK_URL=https://hooks.slack.com/services/... \
//! relay
//!
//! # Or override any of it on the command line
//! relay --rpc https://rpc-a.example --rpc https://rpc-b.example \
//!   --fallback-rpc https://fallback.example -p 8080
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use relay_balancer::{FailoverRouter, HttpServer};
use relay_cli::Cli;
use relay_common::{config, RelayConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Set default log level to INFO, but allow RUST_LOG env var to override
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .init();

    config::load_dotenv()?;
    let config = RelayConfig::from_env(cli.into())?;

    tracing::info!("Cache TTL: {:?}", config.exclusion_ttl);
    tracing::info!("RPCs: {:?}", config.primary);
    tracing::info!("Fallback RPC: {:?}", config.fallback);
    tracing::info!("Slack URL: {}", config.slack_webhook_url);
    tracing::info!("Upstream timeout: {:?}", config.upstream_timeout);

    let router = FailoverRouter::new(&config)?;
    let server = HttpServer::new(Arc::new(router));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    server.run(addr).await?;

    Ok(())
}
