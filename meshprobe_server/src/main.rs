//! WebSocket echo server used to validate Envoy proxy deployments.
//!
//! Holds client connections open and answers every message with the
//! current timestamp and this pod's identity, so the proxy's routing can
//! be read straight off the client logs. A plain HTTP health endpoint
//! runs on a separate port for orchestrator liveness checks.

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use meshprobe_common::identity::PodIdentity;
use meshprobe_common::{health, shutdown};
use meshprobe_server::config::ServerConfig;
use meshprobe_server::server::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;
    let identity = PodIdentity::detect();
    tracing::info!("starting websocket server on {}:{}", config.host, config.port);
    tracing::info!("pod: {} ({})", identity.pod_name, identity.pod_ip);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let state = AppState::new(identity.clone(), shutdown_rx);

    if let Err(e) = health::spawn_listener(
        config.health_port,
        "websocket-server",
        identity,
        Some(state.client_counter()),
    ) {
        tracing::error!("failed to start health listener: {e}");
    }

    tokio::spawn(async move {
        shutdown::signal().await;
        tracing::info!("termination signal received, shutting down");
        shutdown_tx.send_replace(true);
    });

    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?;
    server::serve(listener, state).await?;

    tracing::info!("server shutdown complete");
    Ok(())
}
