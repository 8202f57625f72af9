//! Bounded pool of long-lived WebSocket connections to a single endpoint.
//!
//! The manager loop tops the pool up to `max_connections`, retrying failed
//! attempts every `connection_interval`. Each successful connection is
//! handed to a [`session`](crate::session) task that owns it until the
//! peer closes it, an IO error occurs, or the pool shuts down.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;

use meshprobe_common::identity::PodIdentity;

use crate::config::ClientConfig;
use crate::session;

/// Multiplier applied to `connection_interval` while the pool is full.
const IDLE_MULTIPLIER: u32 = 3;

pub struct ConnectionPool {
    pub(crate) config: ClientConfig,
    pub(crate) identity: PodIdentity,
    pub(crate) shutdown: watch::Sender<bool>,
    /// Ids of currently open connections. Sessions remove themselves.
    active: Mutex<HashSet<u64>>,
    /// Mirror of `active.len()` for the health listener.
    open_count: Arc<AtomicUsize>,
    tasks: Mutex<JoinSet<()>>,
    /// Monotonically increasing; ids are never reused.
    next_id: AtomicU64,
}

impl ConnectionPool {
    pub fn new(config: ClientConfig, identity: PodIdentity) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            config,
            identity,
            shutdown,
            active: Mutex::new(HashSet::new()),
            open_count: Arc::new(AtomicUsize::new(0)),
            tasks: Mutex::new(JoinSet::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Number of currently open connections.
    pub fn open_connections(&self) -> usize {
        self.open_count.load(Ordering::Relaxed)
    }

    /// Counter handle for the health listener.
    pub fn open_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.open_count)
    }

    /// Number of session tasks that have not finished yet.
    pub async fn live_sessions(&self) -> usize {
        self.tasks.lock().await.len()
    }

    pub fn is_running(&self) -> bool {
        !*self.shutdown.borrow()
    }

    /// Top-up loop. Returns once [`stop`](Self::stop) flips the shutdown
    /// flag. Individual connection failures never stop the loop.
    pub async fn run(self: Arc<Self>) {
        tracing::info!(
            "starting connection manager: target {} connection(s) to {}",
            self.config.max_connections,
            self.config.endpoint
        );
        let mut shutdown = self.shutdown.subscribe();

        while !*shutdown.borrow() {
            let interval = if self.open_connections() < self.config.max_connections {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                Arc::clone(&self).attempt_connection(id).await;
                self.config.connection_interval
            } else {
                self.config.connection_interval * IDLE_MULTIPLIER
            };

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {}
            }
        }

        tracing::info!("connection manager stopped");
    }

    async fn attempt_connection(self: Arc<Self>, id: u64) {
        tracing::info!("attempting connection #{id} to {}", self.config.endpoint);
        let request = match self.handshake_request(id) {
            Ok(request) => request,
            Err(e) => {
                tracing::error!("connection #{id}: failed to build handshake request: {e}");
                return;
            }
        };

        match connect_async(request).await {
            Ok((mut stream, _response)) => {
                // sessions are only spawned while holding the tasks lock
                // with the shutdown flag unset, so stop() always joins them
                let mut tasks = self.tasks.lock().await;
                if *self.shutdown.borrow() {
                    tracing::info!("connection #{id} established during shutdown, closing");
                    if let Err(e) = stream.close(None).await {
                        tracing::debug!("connection #{id} close: {e}");
                    }
                    return;
                }
                self.register(id).await;
                tracing::info!(
                    "connection #{id} established (open: {})",
                    self.open_connections()
                );
                tasks.spawn(session::run(Arc::clone(&self), stream, id));
            }
            Err(e) => tracing::warn!("connection #{id} failed: {e}"),
        }
    }

    /// Handshake request tagged with the client's identity, so the proxy
    /// and server logs can attribute each connection.
    fn handshake_request(&self, id: u64) -> anyhow::Result<Request> {
        let mut request = self.config.endpoint.as_str().into_client_request()?;
        let headers = request.headers_mut();
        headers.insert("x-client-id", HeaderValue::from_str(&self.config.client_id)?);
        headers.insert("x-pod-name", HeaderValue::from_str(&self.identity.pod_name)?);
        headers.insert("x-pod-ip", HeaderValue::from_str(&self.identity.pod_ip)?);
        headers.insert("x-connection-id", HeaderValue::from_str(&id.to_string())?);
        Ok(request)
    }

    async fn register(&self, id: u64) {
        let mut active = self.active.lock().await;
        active.insert(id);
        self.open_count.store(active.len(), Ordering::Relaxed);
    }

    pub(crate) async fn deregister(&self, id: u64) {
        let mut active = self.active.lock().await;
        if active.remove(&id) {
            self.open_count.store(active.len(), Ordering::Relaxed);
            tracing::info!("removed connection #{id} (open: {})", active.len());
        }
    }

    /// Shutdown coordinator: stops top-ups, signals every session to close
    /// its socket, and waits up to `grace` for the tasks to finish before
    /// aborting the stragglers. Safe to call more than once.
    pub async fn stop(&self, grace: Duration) {
        self.shutdown.send_replace(true);

        let mut tasks = self.tasks.lock().await;
        let drained = tokio::time::timeout(grace, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                "{} session(s) did not stop within {grace:?}, aborting",
                tasks.len()
            );
            tasks.abort_all();
            while let Some(res) = tasks.join_next().await {
                if let Err(e) = res {
                    if !e.is_cancelled() {
                        tracing::warn!("session task failed during shutdown: {e}");
                    }
                }
            }
        }

        let mut active = self.active.lock().await;
        if !active.is_empty() {
            tracing::debug!("clearing {} connection(s) left in the pool set", active.len());
            active.clear();
        }
        self.open_count.store(0, Ordering::Relaxed);
        tracing::info!("connection pool stopped");
    }
}
