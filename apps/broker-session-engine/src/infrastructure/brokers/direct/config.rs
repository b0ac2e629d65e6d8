//! Direct-auth broker configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the direct-auth broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectAuthConfig {
    /// Base URL of the broker REST API.
    pub base_url: String,
    /// HTTP request timeout in seconds.
    pub timeout_secs: u64,
    /// Display name reported in account profiles.
    pub display_name: String,
    /// Client application version sent with login.
    pub app_version: String,
    /// Request source tag sent with login.
    pub source: String,
}

impl Default for DirectAuthConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.direct-broker.example/NorenWClientTP".to_string(),
            timeout_secs: 30,
            display_name: "Direct Broker".to_string(),
            app_version: "1.0.0".to_string(),
            source: "API".to_string(),
        }
    }
}

impl DirectAuthConfig {
    /// Create a configuration pointed at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// HTTP timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Endpoint URL for `path`.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}
