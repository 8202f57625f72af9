//! Per-connection send/receive loop.
//!
//! Each session owns its socket. It sends a greeting immediately, then
//! alternates between waiting for the echo (bounded by the receive
//! timeout) and sending the next message after a jittered delay. A silent
//! peer gets a keepalive instead of a hangup.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use meshprobe_common::protocol::{timestamp_now, ClientMessage, EchoResponse};

use crate::pool::ConnectionPool;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub(crate) async fn run(pool: Arc<ConnectionPool>, mut stream: WsStream, id: u64) {
    let mut shutdown = pool.shutdown.subscribe();

    // every connection announces itself right away instead of waiting for
    // the first interval
    if let Err(e) = send_message(&pool, &mut stream, id).await {
        tracing::warn!("[conn #{id}] greeting failed: {e}");
        pool.deregister(id).await;
        return;
    }

    loop {
        if *shutdown.borrow() {
            close(&mut stream, id).await;
            break;
        }

        tokio::select! {
            _ = shutdown.changed() => {
                close(&mut stream, id).await;
                break;
            }
            received = tokio::time::timeout(pool.config.receive_timeout, stream.next()) => {
                match received {
                    Ok(Some(Ok(Message::Text(text)))) => {
                        log_response(id, &text);

                        let delay = jitter(
                            pool.config.message_interval_min,
                            pool.config.message_interval_max,
                        );
                        tokio::select! {
                            _ = shutdown.changed() => {
                                close(&mut stream, id).await;
                                break;
                            }
                            _ = tokio::time::sleep(delay) => {}
                        }

                        if let Err(e) = send_message(&pool, &mut stream, id).await {
                            tracing::warn!("[conn #{id}] send failed: {e}");
                            break;
                        }
                    }
                    Ok(Some(Ok(Message::Close(_)))) | Ok(None) => {
                        tracing::info!("[conn #{id}] closed by peer");
                        break;
                    }
                    // ping/pong frames are answered by the protocol layer
                    Ok(Some(Ok(_))) => {}
                    Ok(Some(Err(e))) => {
                        tracing::warn!("[conn #{id}] receive error: {e}");
                        break;
                    }
                    Err(_) => {
                        // peer went quiet, keep the connection warm
                        if let Err(e) = send_message(&pool, &mut stream, id).await {
                            tracing::warn!("[conn #{id}] keepalive failed: {e}");
                            break;
                        }
                        tokio::select! {
                            _ = shutdown.changed() => {
                                close(&mut stream, id).await;
                                break;
                            }
                            _ = tokio::time::sleep(pool.config.keepalive_cooldown) => {}
                        }
                    }
                }
            }
        }
    }

    pool.deregister(id).await;
}

async fn send_message(
    pool: &ConnectionPool,
    stream: &mut WsStream,
    id: u64,
) -> anyhow::Result<()> {
    let body = ClientMessage {
        client_id: pool.config.client_id.clone(),
        pod_name: pool.identity.pod_name.clone(),
        pod_ip: pool.identity.pod_ip.clone(),
        connection_id: id,
        timestamp: timestamp_now(),
        message: format!(
            "Hello from client {} via connection #{id}",
            pool.config.client_id
        ),
    };
    let text = serde_json::to_string(&body)?;
    stream.send(Message::Text(text)).await?;
    tracing::info!("[conn #{id}] sent message");
    Ok(())
}

fn log_response(id: u64, text: &str) {
    match serde_json::from_str::<EchoResponse>(text) {
        Ok(resp) => {
            if let Some(err) = &resp.error {
                tracing::warn!(
                    "[conn #{id}] server pod {} ({}) rejected the payload: {err}",
                    resp.pod_name,
                    resp.pod_ip
                );
            } else {
                tracing::info!(
                    "[conn #{id}] response from server pod {} ({}) at {}",
                    resp.pod_name,
                    resp.pod_ip,
                    resp.timestamp
                );
            }
        }
        Err(e) => tracing::warn!("[conn #{id}] unparseable response ({e}): {text}"),
    }
}

async fn close(stream: &mut WsStream, id: u64) {
    // close-on-already-closed is expected during shutdown
    if let Err(e) = stream.close(None).await {
        tracing::debug!("[conn #{id}] close: {e}");
    }
}

fn jitter(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    rand::thread_rng().gen_range(min..=max)
}
