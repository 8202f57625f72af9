//! Liveness endpoint shared by both binaries.
//!
//! The listener runs on its own OS thread with a single-threaded runtime,
//! independent of the messaging path. It only reads atomic counters.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;

use crate::identity::PodIdentity;
use crate::protocol::timestamp_now;

/// Body returned by `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub timestamp: String,
    pub pod_ip: String,
    pub pod_name: String,
    pub service: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_clients: Option<usize>,
}

#[derive(Clone)]
struct HealthState {
    service: &'static str,
    identity: PodIdentity,
    connections: Option<Arc<AtomicUsize>>,
}

/// Router answering `GET /health` with 200 and anything else with 404.
pub fn router(
    service: &'static str,
    identity: PodIdentity,
    connections: Option<Arc<AtomicUsize>>,
) -> Router {
    let state = HealthState {
        service,
        identity,
        connections,
    };
    Router::new().route("/health", get(health)).with_state(state)
}

async fn health(State(state): State<HealthState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "healthy",
        timestamp: timestamp_now(),
        pod_ip: state.identity.pod_ip.clone(),
        pod_name: state.identity.pod_name.clone(),
        service: state.service,
        connected_clients: state.connections.as_ref().map(|c| c.load(Ordering::Relaxed)),
    })
}

/// Serves the health router on a dedicated thread with its own runtime.
/// Listener failures are logged and never reach the messaging path.
pub fn spawn_listener(
    port: u16,
    service: &'static str,
    identity: PodIdentity,
    connections: Option<Arc<AtomicUsize>>,
) -> std::io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("health".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_io()
                .enable_time()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    tracing::error!("failed to build health runtime: {e}");
                    return;
                }
            };

            runtime.block_on(async move {
                let listener = match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
                    Ok(listener) => listener,
                    Err(e) => {
                        tracing::error!("health listener failed to bind port {port}: {e}");
                        return;
                    }
                };
                tracing::info!("health endpoint listening on port {port}");

                let app = router(service, identity, connections);
                if let Err(e) = axum::serve(listener, app).await {
                    tracing::error!("health listener error: {e}");
                }
            });
        })
}
