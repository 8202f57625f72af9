//! WebSocket echo endpoint and its connection registry.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{watch, RwLock};

use meshprobe_common::identity::PodIdentity;

use crate::echo;

/// Inbound frames larger than this are rejected during the handshake.
const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Shared between all connection handlers.
pub struct AppState {
    identity: PodIdentity,
    clients: RwLock<HashMap<u64, SocketAddr>>,
    /// Mirror of `clients.len()` for the health listener.
    client_count: Arc<AtomicUsize>,
    next_id: AtomicU64,
    shutdown: watch::Receiver<bool>,
}

impl AppState {
    pub fn new(identity: PodIdentity, shutdown: watch::Receiver<bool>) -> Arc<Self> {
        Arc::new(Self {
            identity,
            clients: RwLock::new(HashMap::new()),
            client_count: Arc::new(AtomicUsize::new(0)),
            next_id: AtomicU64::new(1),
            shutdown,
        })
    }

    /// Counter handle for the health listener.
    pub fn client_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.client_count)
    }

    async fn register(&self, id: u64, addr: SocketAddr) {
        let mut clients = self.clients.write().await;
        clients.insert(id, addr);
        self.client_count.store(clients.len(), Ordering::Relaxed);
        tracing::info!("client connected: {addr} (total: {})", clients.len());
    }

    async fn unregister(&self, id: u64) {
        let mut clients = self.clients.write().await;
        if let Some(addr) = clients.remove(&id) {
            self.client_count.store(clients.len(), Ordering::Relaxed);
            tracing::info!("client disconnected: {addr} (total: {})", clients.len());
        }
    }
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new().route("/", get(ws_handler)).with_state(state)
}

/// Serves the echo endpoint until the shutdown flag flips.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> anyhow::Result<()> {
    let mut shutdown = state.shutdown.clone();
    let app = app(state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;
    Ok(())
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_socket(socket, addr, state))
}

/// One handler task per connection: echo every text frame back, wrapped
/// with timestamp and pod identity.
async fn handle_socket(mut socket: WebSocket, addr: SocketAddr, state: Arc<AppState>) {
    let id = state.next_id.fetch_add(1, Ordering::Relaxed);
    state.register(id, addr).await;
    let mut shutdown = state.shutdown.clone();

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if let Err(e) = socket.send(Message::Close(None)).await {
                    tracing::debug!("closing {addr}: {e}");
                }
                break;
            }
            msg = socket.recv() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let response = echo::respond(&state.identity, &text);
                    let body = match serde_json::to_string(&response) {
                        Ok(body) => body,
                        Err(e) => {
                            tracing::error!("failed to serialize echo response: {e}");
                            continue;
                        }
                    };
                    if let Err(e) = socket.send(Message::Text(body)).await {
                        tracing::warn!("error sending echo to {addr}: {e}");
                        break;
                    }
                    tracing::info!("processed message from {addr}");
                }
                Some(Ok(Message::Close(_))) | None => {
                    tracing::info!("client {addr} closed the connection");
                    break;
                }
                // ping/pong frames are answered by the protocol layer
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!("receive error from {addr}: {e}");
                    break;
                }
            }
        }
    }

    state.unregister(id).await;
}
