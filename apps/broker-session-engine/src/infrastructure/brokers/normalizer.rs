//! Response Normalizer
//!
//! Maps broker-native failures (HTTP status codes, free-text messages,
//! transport errors) onto canonical `ErrorKind`s, and broker order payloads
//! onto the canonical trading envelope.
//!
//! Keyword rules are checked in order; the first match wins. Session and
//! token wording outranks transport wording, so "session timed out" is an
//! expiry rather than a network fault. Status codes are checked before
//! keywords when both are available.

use serde_json::Value;

use super::error::TransportError;
use crate::application::ports::TradingResponse;
use crate::domain::session::ErrorKind;

/// Classify an HTTP status code. `None` for statuses that carry no
/// classification on their own (2xx, 3xx, unmapped 4xx).
#[must_use]
pub const fn classify_status(status: u16) -> Option<ErrorKind> {
    match status {
        429 => Some(ErrorKind::RateLimited),
        408 => Some(ErrorKind::NetworkError),
        401 | 403 => Some(ErrorKind::AuthFailed),
        400 | 422 => Some(ErrorKind::ValidationError),
        500..=599 => Some(ErrorKind::ServerError),
        _ => None,
    }
}

/// Classify a free-text broker message.
#[must_use]
pub fn classify_message(message: &str) -> ErrorKind {
    let text = message.to_ascii_lowercase();
    let has = |needle: &str| text.contains(needle);

    if has("rate limit") || has("too many requests") || has("throttl") {
        ErrorKind::RateLimited
    } else if has("auth code")
        || has("authorization code")
        || has("auth_code")
        || has("invalid_grant")
    {
        ErrorKind::AuthCodeExpired
    } else if has("refresh token") || has("refresh_token") {
        ErrorKind::RefreshTokenExpired
    } else if (has("session") || has("token"))
        && (has("expired") || has("expiry") || has("timed out") || has("timeout"))
    {
        ErrorKind::TokenExpired
    } else if has("session")
        || has("token")
        || has("login")
        || has("unauthori")
        || has("credential")
        || has("password")
        || has("totp")
        || has("not authenticated")
    {
        ErrorKind::AuthFailed
    } else if has("timed out") || has("timeout") || has("connection") || has("network") {
        ErrorKind::NetworkError
    } else if has("order not found") || has("no such order") || has("invalid order id") {
        ErrorKind::OrderNotFound
    } else if has("invalid") || has("missing") || has("required") || has("must be") {
        ErrorKind::ValidationError
    } else if has("reject") || has("not allowed") || has("insufficient") {
        ErrorKind::BrokerError
    } else {
        ErrorKind::Unknown
    }
}

/// Classify a broker response that reported failure, using the status code
/// when it is decisive and the message otherwise.
#[must_use]
pub fn classify_response(status: u16, message: &str) -> ErrorKind {
    match classify_status(status) {
        // A 400 that names an auth code or token is more specific than
        // "validation error".
        Some(ErrorKind::ValidationError) => match classify_message(message) {
            ErrorKind::Unknown => ErrorKind::ValidationError,
            kind => kind,
        },
        Some(ErrorKind::AuthFailed) => match classify_message(message) {
            kind @ (ErrorKind::TokenExpired
            | ErrorKind::RefreshTokenExpired
            | ErrorKind::AuthCodeExpired) => kind,
            _ => ErrorKind::AuthFailed,
        },
        Some(kind) => kind,
        None if status == 404 && classify_message(message) == ErrorKind::OrderNotFound => {
            ErrorKind::OrderNotFound
        }
        None => match classify_message(message) {
            ErrorKind::Unknown if status >= 400 => ErrorKind::BrokerError,
            kind => kind,
        },
    }
}

/// Classify a transport error.
#[must_use]
pub fn classify_transport(err: &TransportError) -> ErrorKind {
    match err {
        TransportError::Timeout | TransportError::Connection(_) => ErrorKind::NetworkError,
        TransportError::Decode(_) => ErrorKind::BrokerError,
        TransportError::Rejected(message) => match classify_message(message) {
            ErrorKind::Unknown => ErrorKind::BrokerError,
            kind => kind,
        },
        TransportError::Http {
            status, message, ..
        } => classify_response(*status, message),
    }
}

/// Field names brokers use for the order id, in lookup order.
const ORDER_ID_FIELDS: &[&str] = &["order_id", "orderId", "norenordno", "orderid", "id"];

/// Field names brokers use for a human-readable message.
const MESSAGE_FIELDS: &[&str] = &["message", "emsg", "error", "msg", "stat"];

/// Extract the broker message from a JSON body.
#[must_use]
pub fn extract_message(body: &Value) -> Option<String> {
    MESSAGE_FIELDS
        .iter()
        .find_map(|field| body.get(field).and_then(Value::as_str))
        .map(str::to_string)
}

/// Normalize a broker order response into the canonical trading envelope.
#[must_use]
pub fn normalize_order_response(success: bool, body: Value) -> TradingResponse {
    let order_id = ORDER_ID_FIELDS.iter().find_map(|field| match body.get(field) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    });
    let message = extract_message(&body).unwrap_or_else(|| {
        if success {
            "Order accepted".to_string()
        } else {
            "Order rejected".to_string()
        }
    });
    let error_kind = (!success).then(|| match classify_message(&message) {
        ErrorKind::Unknown => ErrorKind::BrokerError,
        kind => kind,
    });

    TradingResponse {
        success,
        order_id,
        message,
        error_kind,
        data: Some(body),
    }
}
