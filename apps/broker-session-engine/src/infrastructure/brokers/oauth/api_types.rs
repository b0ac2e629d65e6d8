//! OAuth broker wire types.

use serde::{Deserialize, Serialize};

/// Authorization-code exchange request.
#[derive(Debug, Clone, Serialize)]
pub struct TokenExchangeRequest {
    /// Always `authorization_code`.
    pub grant_type: String,
    /// SHA-256 hex of `"{client_id}:{secret_key}"`.
    #[serde(rename = "appIdHash")]
    pub app_id_hash: String,
    /// Code returned to the redirect URI.
    pub code: String,
}

/// Refresh request.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshRequest {
    /// Always `refresh_token`.
    pub grant_type: String,
    /// SHA-256 hex of `"{client_id}:{secret_key}"`.
    #[serde(rename = "appIdHash")]
    pub app_id_hash: String,
    /// Refresh token issued with the access token.
    pub refresh_token: String,
    /// HMAC-SHA256 hex keyed by the secret.
    pub signature: String,
    /// User PIN, when the broker requires it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,
}

/// Token endpoint response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TokenResponse {
    /// `ok` or `error`.
    #[serde(default)]
    pub s: Option<String>,
    /// Access token.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Error message.
    #[serde(default)]
    pub message: Option<String>,
}

/// Profile endpoint response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileResponse {
    /// `ok` or `error`.
    #[serde(default)]
    pub s: Option<String>,
    /// Profile payload.
    #[serde(default)]
    pub data: Option<ProfileData>,
    /// Error message.
    #[serde(default)]
    pub message: Option<String>,
}

/// Profile payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProfileData {
    /// Broker client id.
    #[serde(default, alias = "fy_id")]
    pub client_id: Option<String>,
    /// Account holder name.
    #[serde(default)]
    pub name: Option<String>,
    /// Registered email.
    #[serde(default, alias = "email_id")]
    pub email: Option<String>,
}

/// Issued token pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    /// Access token.
    pub access_token: String,
    /// Refresh token, when issued.
    pub refresh_token: Option<String>,
    /// Lifetime in seconds, when reported.
    pub expires_in: Option<i64>,
}
