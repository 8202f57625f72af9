use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use meshprobe_common::health;
use meshprobe_common::identity::PodIdentity;
use tokio::net::TcpListener;

fn test_identity() -> PodIdentity {
    PodIdentity {
        pod_name: "test-pod".to_string(),
        pod_ip: "10.0.0.1".to_string(),
    }
}

async fn serve_router(app: axum::Router) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn health_returns_status_json() {
    let counter = Arc::new(AtomicUsize::new(4));
    let app = health::router("websocket-server", test_identity(), Some(counter));
    let addr = serve_router(app).await;

    let resp = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["pod_name"], "test-pod");
    assert_eq!(body["pod_ip"], "10.0.0.1");
    assert_eq!(body["service"], "websocket-server");
    assert_eq!(body["connected_clients"], 4);
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn health_without_counter_omits_count() {
    let app = health::router("websocket-client", test_identity(), None);
    let addr = serve_router(app).await;

    let body: serde_json::Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(body.get("connected_clients").is_none());
}

#[tokio::test]
async fn other_paths_are_404() {
    let app = health::router("websocket-server", test_identity(), None);
    let addr = serve_router(app).await;

    let resp = reqwest::get(format!("http://{addr}/anything")).await.unwrap();
    assert_eq!(resp.status(), 404);
}
