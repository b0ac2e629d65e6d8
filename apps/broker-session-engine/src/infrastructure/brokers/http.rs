//! Shared reqwest plumbing for the thin broker clients.

use std::time::Duration;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

use super::error::TransportError;
use super::normalizer::extract_message;

/// Build a client with a request timeout.
///
/// # Errors
///
/// Returns `TransportError::Connection` if the TLS backend cannot be
/// initialized.
pub fn build_client(timeout: Duration) -> Result<Client, TransportError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| TransportError::Connection(e.to_string()))
}

/// Decode a response body, turning non-success statuses into
/// `TransportError::Http` with the broker's message.
///
/// # Errors
///
/// Returns `Http` for non-2xx statuses and `Decode` for bodies that are not
/// the expected JSON.
pub async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, TransportError> {
    let status = response.status();

    if status.is_success() {
        let text = response.text().await?;
        let body = if text.is_empty() { "null" } else { text.as_str() };
        return Ok(serde_json::from_str(body)?);
    }

    let retry_after = response
        .headers()
        .get("Retry-After")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| extract_message(&v))
        .unwrap_or(body);

    Err(TransportError::Http {
        status: status.as_u16(),
        message,
        retry_after,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::Value;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn error_status_carries_message_and_retry_hint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/limited"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("Retry-After", "7")
                    .set_body_json(serde_json::json!({"message": "Too many requests"})),
            )
            .mount(&server)
            .await;

        let client = build_client(Duration::from_secs(5)).unwrap();
        let response = client
            .get(format!("{}/limited", server.uri()))
            .send()
            .await
            .unwrap();
        let err = read_json::<Value>(response).await.unwrap_err();

        assert_eq!(
            err,
            TransportError::Http {
                status: 429,
                message: "Too many requests".into(),
                retry_after: Some(Duration::from_secs(7)),
            }
        );
    }

    #[tokio::test]
    async fn empty_success_body_decodes_as_null() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/empty"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = build_client(Duration::from_secs(5)).unwrap();
        let response = client
            .get(format!("{}/empty", server.uri()))
            .send()
            .await
            .unwrap();
        let value: Value = read_json(response).await.unwrap();
        assert!(value.is_null());
    }
}
