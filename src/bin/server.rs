//! Ventas relay server
//!
//! Run with: ventas-relay --upstream-host sales.internal --upstream-port 9090

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ventas_relay::config::RelayConfig;
use ventas_relay::relay::{OriginPolicy, Relay, RelayServer};
use ventas_relay::upstream::{ChannelManager, GrpcTransport};

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_ansi(false))
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = RelayConfig::parse();
    init_logging(config.log_json);

    // A bad upstream address is fatal; an unreachable upstream is not.
    let target = config
        .upstream_target()
        .context("invalid upstream configuration")?;
    let transport = GrpcTransport::new(config.connect_timeout());
    transport
        .endpoint(&target)
        .context("invalid upstream configuration")?;

    let channels = Arc::new(ChannelManager::new(target, transport));
    if let Err(e) = channels.ensure_ready().await {
        tracing::warn!("Upstream not reachable at startup, will retry per session: {}", e);
    }

    let relay = Relay::new(Arc::clone(&channels)).with_error_grace(config.error_grace());
    let origins = OriginPolicy::new(config.allowed_origins.clone());

    tracing::info!(
        version = ventas_relay::VERSION,
        upstream = %channels.target(),
        "Ventas relay starting..."
    );
    RelayServer::new(relay, origins, config.bind)
        .start(shutdown_signal())
        .await
        .context("relay server failed")?;

    channels.shutdown();
    tracing::info!("Ventas relay stopped");

    Ok(())
}
