//! Broker Adapter Port (Driven Port)
//!
//! The contract every broker implementation satisfies, plus the canonical
//! envelopes its operations return. Adapters never return `Err`: every
//! broker failure is folded into an envelope with `success == false` and a
//! classified `ErrorKind`.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::session::{
    AccountInfo, AccountStatus, AuthenticationStep, ErrorKind, TokenInfo,
};

// =============================================================================
// Credentials
// =============================================================================

/// Opaque, already-decrypted credential bag supplied per call.
///
/// Values never appear in `Debug` output. The engine keeps the bag in memory
/// while a session is live and never persists it.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    fields: BTreeMap<String, String>,
}

impl Credentials {
    /// Empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Non-empty value of a field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Names from `required` that are missing or blank.
    #[must_use]
    pub fn missing<'a>(&self, required: &[&'a str]) -> Vec<&'a str> {
        required
            .iter()
            .copied()
            .filter(|name| self.get(name).is_none())
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Credentials {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.fields.keys().map(|k| (k, "[REDACTED]")))
            .finish()
    }
}

// =============================================================================
// Canonical Envelopes
// =============================================================================

/// Which authentication protocol a broker speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthFlow {
    /// One-step login with credentials and a rotating one-time code.
    Direct,
    /// Authorization-code exchange followed by refreshable tokens.
    Oauth,
}

/// Canonical result of every authentication operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    /// Whether the operation achieved its goal.
    pub success: bool,
    /// Human-readable message.
    pub message: String,
    /// Account status after the operation.
    pub account_status: AccountStatus,
    /// Next step the caller must take.
    pub authentication_step: AuthenticationStep,
    /// Classified failure, when `success == false`.
    pub error_kind: Option<ErrorKind>,
    /// Account profile, when the operation produced one.
    pub account_info: Option<AccountInfo>,
    /// Token material, when the operation produced one.
    pub token_info: Option<TokenInfo>,
    /// URL the user must visit to grant consent.
    pub authorization_url: Option<String>,
    /// Suggested wait before retrying, for rate-limited calls.
    #[serde(with = "optional_duration_secs")]
    pub retry_after: Option<Duration>,
    /// Broker-specific extras.
    pub data: Option<serde_json::Value>,
}

/// Result of `connect`.
pub type ConnectionResult = AuthResponse;
/// Result of `completeOAuth`.
pub type OAuthResult = AuthResponse;
/// Result of `refreshToken`.
pub type RefreshResult = AuthResponse;
/// Result of `validateSession`.
pub type ValidationResult = AuthResponse;

impl AuthResponse {
    /// Successful envelope.
    #[must_use]
    pub fn success(
        status: AccountStatus,
        step: AuthenticationStep,
        message: impl Into<String>,
    ) -> Self {
        Self {
            success: true,
            message: message.into(),
            account_status: status,
            authentication_step: step,
            error_kind: None,
            account_info: None,
            token_info: None,
            authorization_url: None,
            retry_after: None,
            data: None,
        }
    }

    /// Failed envelope.
    #[must_use]
    pub fn failure(
        kind: ErrorKind,
        message: impl Into<String>,
        status: AccountStatus,
        step: AuthenticationStep,
    ) -> Self {
        Self {
            success: false,
            message: message.into(),
            account_status: status,
            authentication_step: step,
            error_kind: Some(kind),
            account_info: None,
            token_info: None,
            authorization_url: None,
            retry_after: None,
            data: None,
        }
    }

    /// Attach token material.
    #[must_use]
    pub fn with_token(mut self, token: TokenInfo) -> Self {
        self.token_info = Some(token);
        self
    }

    /// Attach an account profile.
    #[must_use]
    pub fn with_account(mut self, account: AccountInfo) -> Self {
        self.account_info = Some(account);
        self
    }

    /// Attach the consent URL.
    #[must_use]
    pub fn with_authorization_url(mut self, url: impl Into<String>) -> Self {
        self.authorization_url = Some(url.into());
        self
    }

    /// Attach a retry hint.
    #[must_use]
    pub const fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    /// Attach broker extras.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// True if the failure was classified as transient.
    #[must_use]
    pub fn is_transient_failure(&self) -> bool {
        !self.success && self.error_kind.is_some_and(|k| k.is_transient())
    }
}

/// Canonical result of a trading call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradingResponse {
    /// Whether the broker accepted the request.
    pub success: bool,
    /// Broker order id, when one was assigned.
    pub order_id: Option<String>,
    /// Human-readable message.
    pub message: String,
    /// Classified failure, when `success == false`.
    pub error_kind: Option<ErrorKind>,
    /// Broker-specific extras.
    pub data: Option<serde_json::Value>,
}

mod optional_duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs = Option::<f64>::deserialize(d)?;
        Ok(secs.filter(|s| s.is_finite() && *s >= 0.0).map(Duration::from_secs_f64))
    }
}

// =============================================================================
// Adapter Contract
// =============================================================================

/// Port implemented by every broker adapter.
///
/// One instance serves one session. The token it caches is loaded from the
/// session store with [`BrokerAdapter::hydrate`] before each operation.
#[async_trait]
pub trait BrokerAdapter: Send {
    /// Registered plugin name.
    fn broker_name(&self) -> &str;

    /// Authentication protocol.
    fn auth_flow(&self) -> AuthFlow;

    /// Load the store's view of the session into the adapter cache.
    fn hydrate(
        &mut self,
        status: AccountStatus,
        token_info: Option<TokenInfo>,
        account_info: Option<AccountInfo>,
    );

    /// Start authentication.
    async fn connect(&mut self, credentials: &Credentials) -> ConnectionResult;

    /// Exchange an OAuth authorization code.
    async fn complete_oauth(&mut self, auth_code: &str, credentials: &Credentials) -> OAuthResult;

    /// Obtain a new access token.
    async fn refresh_token(&mut self, credentials: &Credentials) -> RefreshResult;

    /// Check that the broker still accepts the session.
    async fn validate_session(&mut self, credentials: &Credentials) -> ValidationResult;

    /// Best-effort logout. Local state is always reset to `INACTIVE`.
    async fn disconnect(&mut self) -> bool;

    /// Whether the adapter holds a usable session.
    fn is_connected(&self) -> bool;

    /// Cached status.
    fn account_status(&self) -> AccountStatus;

    /// Cached token.
    fn token_info(&self) -> Option<&TokenInfo>;

    /// Cached account profile.
    fn account_info(&self) -> Option<&AccountInfo>;
}
