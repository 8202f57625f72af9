use anyhow::Result;
use meshprobe_common::env::parse_or;

/// Listener configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub health_port: u16,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            host: lookup("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&lookup, "SERVER_PORT", 8080)?,
            health_port: parse_or(&lookup, "HEALTH_PORT", 8081)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServerConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.health_port, 8081);
    }

    #[test]
    fn overrides() {
        let config = ServerConfig::from_lookup(|key| match key {
            "SERVER_HOST" => Some("127.0.0.1".to_string()),
            "SERVER_PORT" => Some("9090".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9090);
    }

    #[test]
    fn invalid_port_is_an_error() {
        let res = ServerConfig::from_lookup(|key| {
            (key == "SERVER_PORT").then(|| "not-a-port".to_string())
        });
        assert!(res.is_err());
    }
}
