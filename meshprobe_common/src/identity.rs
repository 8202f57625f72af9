use local_ip_address::local_ip;

/// Identity of the pod this process runs in, stamped into every message.
#[derive(Debug, Clone)]
pub struct PodIdentity {
    pub pod_name: String,
    pub pod_ip: String,
}

impl PodIdentity {
    /// Reads the identity from the environment. The downward-API variables
    /// win; without them the address of the local interface is used.
    pub fn detect() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let pod_name = lookup("HOSTNAME").unwrap_or_else(|| "unknown-pod".to_string());
        let pod_ip = match lookup("POD_IP") {
            Some(ip) => ip,
            None => match local_ip() {
                Ok(ip) => ip.to_string(),
                Err(e) => {
                    tracing::warn!("could not determine pod ip: {e}");
                    "unknown".to_string()
                }
            },
        };
        Self { pod_name, pod_ip }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_values_win() {
        let identity = PodIdentity::from_lookup(|key| match key {
            "HOSTNAME" => Some("pod-a".to_string()),
            "POD_IP" => Some("10.1.2.3".to_string()),
            _ => None,
        });
        assert_eq!(identity.pod_name, "pod-a");
        assert_eq!(identity.pod_ip, "10.1.2.3");
    }

    #[test]
    fn missing_hostname_falls_back() {
        let identity = PodIdentity::from_lookup(|key| match key {
            "POD_IP" => Some("10.1.2.3".to_string()),
            _ => None,
        });
        assert_eq!(identity.pod_name, "unknown-pod");
    }
}
