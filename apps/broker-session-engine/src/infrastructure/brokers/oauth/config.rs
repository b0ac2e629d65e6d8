//! OAuth broker configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the OAuth broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// Base URL of the broker REST API.
    pub base_url: String,
    /// Consent page the user is sent to.
    pub authorize_url: String,
    /// HTTP request timeout in seconds.
    pub timeout_secs: u64,
    /// Token lifetime assumed when the broker omits `expires_in`.
    pub default_token_lifetime_secs: u64,
    /// Display name reported in account profiles.
    pub display_name: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.oauth-broker.example/api/v3".to_string(),
            authorize_url: "https://api.oauth-broker.example/api/v3/generate-authcode"
                .to_string(),
            timeout_secs: 30,
            default_token_lifetime_secs: 24 * 60 * 60,
            display_name: "OAuth Broker".to_string(),
        }
    }
}

impl OAuthConfig {
    /// Create a configuration with both URLs under `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let authorize_url = format!("{}/generate-authcode", base_url.trim_end_matches('/'));
        Self {
            base_url,
            authorize_url,
            ..Self::default()
        }
    }

    /// HTTP timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Default token lifetime.
    #[must_use]
    pub fn default_token_lifetime(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.default_token_lifetime_secs).unwrap_or(i64::MAX))
    }

    /// Endpoint URL for `path`.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}
