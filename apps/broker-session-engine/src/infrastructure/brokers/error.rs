//! Transport errors raised by the thin broker HTTP clients.

use std::time::Duration;

use thiserror::Error;

use crate::domain::session::ErrorKind;

/// Errors from a broker-native HTTP client.
///
/// Clients own transport only; the normalizer turns these into `ErrorKind`s
/// before anything crosses the adapter boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Request did not complete within the client timeout.
    #[error("Request timed out")]
    Timeout,

    /// Connection could not be established or was reset.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Response body was not the expected JSON.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Broker answered successfully at the HTTP level but rejected the call.
    #[error("Broker rejected request: {0}")]
    Rejected(String),

    /// Broker answered with a non-success HTTP status.
    #[error("HTTP {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Broker message extracted from the body, or the raw body.
        message: String,
        /// `Retry-After` hint, when present.
        retry_after: Option<Duration>,
    },
}

impl TransportError {
    /// Classify into a canonical error kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        super::normalizer::classify_transport(self)
    }

    /// Retry hint carried by a rate-limited response.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Http { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Http {
                status: status.as_u16(),
                message: err.to_string(),
                retry_after: None,
            }
        } else {
            Self::Connection(err.to_string())
        }
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}
