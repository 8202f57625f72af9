//! JSON message bodies exchanged between the load client and the echo
//! server. All timestamps on the wire are ISO-8601 UTC strings.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message the load client sends over each pooled connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMessage {
    pub client_id: String,
    pub pod_name: String,
    pub pod_ip: String,
    pub connection_id: u64,
    pub timestamp: String,
    pub message: String,
}

/// Reply the echo server produces for every inbound frame.
///
/// `received_message` holds the parsed payload, or the raw text when the
/// input was not valid JSON, in which case `error` is set as well.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EchoResponse {
    pub timestamp: String,
    pub pod_ip: String,
    pub pod_name: String,
    pub received_message: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_info: Option<ServerInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub version: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Current time as an ISO-8601 UTC string.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
