use meshprobe_common::identity::PodIdentity;
use meshprobe_common::protocol::{timestamp_now, EchoResponse, ServerInfo};
use serde_json::Value;

/// Builds the echo reply for one inbound frame.
///
/// Well-formed JSON is wrapped as-is under `received_message`; anything
/// else is reflected back as a string with an `error` field. Malformed
/// input never drops the connection.
pub fn respond(identity: &PodIdentity, raw: &str) -> EchoResponse {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => EchoResponse {
            timestamp: timestamp_now(),
            pod_ip: identity.pod_ip.clone(),
            pod_name: identity.pod_name.clone(),
            received_message: value,
            server_info: Some(ServerInfo {
                version: env!("CARGO_PKG_VERSION").to_string(),
                kind: "websocket-server".to_string(),
            }),
            error: None,
        },
        Err(_) => EchoResponse {
            timestamp: timestamp_now(),
            pod_ip: identity.pod_ip.clone(),
            pod_name: identity.pod_name.clone(),
            received_message: Value::String(raw.to_string()),
            server_info: None,
            error: Some("Invalid JSON format".to_string()),
        },
    }
}
