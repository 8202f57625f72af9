use std::time::Duration;

use anyhow::{bail, Result};
use meshprobe_common::env::parse_or;

/// How long a session waits for a reply before sending a keepalive.
const RECEIVE_TIMEOUT: Duration = Duration::from_secs(5);
/// Fixed pause after a keepalive send.
const KEEPALIVE_COOLDOWN: Duration = Duration::from_secs(1);

/// Load-generator configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: String,
    pub client_id: String,
    pub max_connections: usize,
    pub connection_interval: Duration,
    pub message_interval_min: Duration,
    pub message_interval_max: Duration,
    pub health_port: u16,
    /// Not part of the environment surface; tests shorten these.
    pub receive_timeout: Duration,
    pub keepalive_cooldown: Duration,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let endpoint = lookup("ENVOY_ENDPOINT").unwrap_or_else(|| {
            "ws://envoy-proxy-service.default.svc.cluster.local:80".to_string()
        });
        let client_id = lookup("CLIENT_ID").unwrap_or_else(|| {
            let host = lookup("HOSTNAME").unwrap_or_else(|| "unknown".to_string());
            format!("client-{host}")
        });

        let max_connections: usize = parse_or(&lookup, "MAX_CONNECTIONS", 5)?;
        if max_connections == 0 {
            bail!("MAX_CONNECTIONS must be at least 1");
        }

        let connection_interval =
            Duration::from_secs(parse_or(&lookup, "CONNECTION_INTERVAL", 10)?);
        let message_interval_min =
            Duration::from_secs(parse_or(&lookup, "MESSAGE_INTERVAL_MIN", 10)?);
        let message_interval_max =
            Duration::from_secs(parse_or(&lookup, "MESSAGE_INTERVAL_MAX", 20)?);
        if message_interval_min > message_interval_max {
            bail!(
                "MESSAGE_INTERVAL_MIN ({}s) exceeds MESSAGE_INTERVAL_MAX ({}s)",
                message_interval_min.as_secs(),
                message_interval_max.as_secs()
            );
        }

        Ok(Self {
            endpoint,
            client_id,
            max_connections,
            connection_interval,
            message_interval_min,
            message_interval_max,
            health_port: parse_or(&lookup, "HEALTH_PORT", 8081)?,
            receive_timeout: RECEIVE_TIMEOUT,
            keepalive_cooldown: KEEPALIVE_COOLDOWN,
        })
    }
}
