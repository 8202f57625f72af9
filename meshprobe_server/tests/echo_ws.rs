use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use meshprobe_common::identity::PodIdentity;
use meshprobe_common::protocol::EchoResponse;
use meshprobe_server::server::{self, AppState};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn start_server() -> (SocketAddr, watch::Sender<bool>) {
    let (tx, rx) = watch::channel(false);
    let identity = PodIdentity {
        pod_name: "test-pod".to_string(),
        pod_ip: "10.0.0.1".to_string(),
    };
    let state = AppState::new(identity, rx);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        server::serve(listener, state).await.unwrap();
    });
    (addr, tx)
}

async fn send_and_receive(ws: &mut WsStream, body: &str) -> EchoResponse {
    ws.send(Message::Text(body.to_string())).await.unwrap();
    loop {
        match ws.next().await.expect("connection closed").unwrap() {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            // ignore protocol frames
            _ => continue,
        }
    }
}

#[tokio::test]
async fn echoes_payload_with_pod_identity() {
    let (addr, _tx) = start_server().await;
    let (mut ws, _) = connect_async(format!("ws://{addr}/")).await.unwrap();

    let payload = json!({
        "client_id": "c1",
        "pod_name": "client-pod",
        "pod_ip": "10.0.0.9",
        "connection_id": 1,
        "timestamp": "2026-01-01T00:00:00Z",
        "message": "hello"
    });
    let resp = send_and_receive(&mut ws, &payload.to_string()).await;

    assert_eq!(resp.received_message, payload);
    assert_eq!(resp.pod_name, "test-pod");
    assert_eq!(resp.pod_ip, "10.0.0.1");
    assert!(resp.error.is_none());
    assert_eq!(resp.server_info.unwrap().kind, "websocket-server");
}

#[tokio::test]
async fn malformed_input_keeps_the_connection_open() {
    let (addr, _tx) = start_server().await;
    let (mut ws, _) = connect_async(format!("ws://{addr}/")).await.unwrap();

    let resp = send_and_receive(&mut ws, "not json at all").await;
    assert_eq!(resp.error.as_deref(), Some("Invalid JSON format"));
    assert_eq!(
        resp.received_message,
        serde_json::Value::String("not json at all".to_string())
    );

    // connection must still answer well-formed messages afterwards
    let resp = send_and_receive(&mut ws, &json!({"message": "still here"}).to_string()).await;
    assert!(resp.error.is_none());
    assert_eq!(resp.received_message["message"], json!("still here"));
}

#[tokio::test]
async fn shutdown_closes_connections() {
    let (addr, tx) = start_server().await;
    let (mut ws, _) = connect_async(format!("ws://{addr}/")).await.unwrap();

    // connection is live before the flag flips
    send_and_receive(&mut ws, &json!({"message": "ping"}).to_string()).await;

    tx.send_replace(true);

    // server sends a close frame and the stream ends
    let deadline = tokio::time::Duration::from_secs(5);
    let closed = tokio::time::timeout(deadline, async {
        while let Some(msg) = ws.next().await {
            if matches!(msg, Ok(Message::Close(_)) | Err(_)) {
                break;
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "server did not close the connection");
}
