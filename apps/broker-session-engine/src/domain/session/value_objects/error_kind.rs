//! Canonical error classification shared by every broker.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Broker-independent error kind.
///
/// Broker-native errors are mapped to one of these before they leave an
/// adapter. Retry behaviour keys off the kind, never the native payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Credentials or session rejected by the broker.
    AuthFailed,
    /// OAuth authorization code expired or already used.
    AuthCodeExpired,
    /// Access token expired.
    TokenExpired,
    /// Refresh token expired or revoked.
    RefreshTokenExpired,
    /// Connection-level failure or timeout.
    NetworkError,
    /// Broker rejected the request for a business reason.
    BrokerError,
    /// Input was missing or malformed.
    ValidationError,
    /// Broker or local rate limit exceeded.
    RateLimited,
    /// Referenced order does not exist.
    OrderNotFound,
    /// Broker-side server failure.
    ServerError,
    /// Could not be classified.
    Unknown,
}

impl ErrorKind {
    /// Transient kinds are retried on the next supervisor tick and never
    /// change the account status.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NetworkError | Self::RateLimited | Self::ServerError
        )
    }

    /// Kinds the user must fix; never retried automatically.
    #[must_use]
    pub const fn is_non_retryable(&self) -> bool {
        matches!(self, Self::ValidationError | Self::AuthCodeExpired)
    }

    /// Kinds that mean the broker no longer accepts the session.
    #[must_use]
    pub const fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::AuthFailed | Self::TokenExpired | Self::RefreshTokenExpired
        )
    }

    /// Wire name of the kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AuthFailed => "AUTH_FAILED",
            Self::AuthCodeExpired => "AUTH_CODE_EXPIRED",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::RefreshTokenExpired => "REFRESH_TOKEN_EXPIRED",
            Self::NetworkError => "NETWORK_ERROR",
            Self::BrokerError => "BROKER_ERROR",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::RateLimited => "RATE_LIMITED",
            Self::OrderNotFound => "ORDER_NOT_FOUND",
            Self::ServerError => "SERVER_ERROR",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
