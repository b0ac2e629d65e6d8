//! Server configuration for the health and metrics endpoint.

use serde::{Deserialize, Serialize};

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP port for /health, /healthz, /readyz and /metrics.
    #[serde(default = "default_health_port")]
    pub health_port: u16,
    /// Bind address.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            health_port: default_health_port(),
            bind_address: default_bind_address(),
        }
    }
}

pub(crate) const fn default_health_port() -> u16 {
    8083
}

pub(crate) fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
