//! WebSocket load client used to validate Envoy proxy deployments.
//!
//! Keeps a bounded pool of persistent connections open through the proxy
//! and emits messages at randomized intervals, logging which server pod
//! answered each one. A plain HTTP health endpoint runs on a separate
//! port for orchestrator liveness checks.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use meshprobe_client::config::ClientConfig;
use meshprobe_client::pool::ConnectionPool;
use meshprobe_common::identity::PodIdentity;
use meshprobe_common::{health, shutdown};

/// How long `stop` waits for sessions before aborting them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ClientConfig::from_env()?;
    let identity = PodIdentity::detect();
    tracing::info!("starting websocket client {}", config.client_id);
    tracing::info!("endpoint: {}", config.endpoint);
    tracing::info!("pod: {} ({})", identity.pod_name, identity.pod_ip);

    let pool = ConnectionPool::new(config.clone(), identity.clone());

    if let Err(e) = health::spawn_listener(
        config.health_port,
        "websocket-client",
        identity,
        Some(pool.open_counter()),
    ) {
        tracing::error!("failed to start health listener: {e}");
    }

    let manager = tokio::spawn({
        let pool = Arc::clone(&pool);
        async move { pool.run().await }
    });

    shutdown::signal().await;
    tracing::info!("termination signal received, shutting down");

    pool.stop(SHUTDOWN_GRACE).await;
    manager.await?;

    tracing::info!("client shutdown complete");
    Ok(())
}
