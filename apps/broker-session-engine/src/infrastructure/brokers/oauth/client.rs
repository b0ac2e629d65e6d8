//! Thin client for the OAuth broker. Owns transport only.

use async_trait::async_trait;
use reqwest::Client;

use super::api_types::{
    IssuedToken, ProfileData, ProfileResponse, RefreshRequest, TokenExchangeRequest,
    TokenResponse,
};
use super::config::OAuthConfig;
use crate::infrastructure::brokers::error::TransportError;
use crate::infrastructure::brokers::http::{build_client, read_json};

/// Broker-native operations used by the OAuth adapter.
#[async_trait]
pub trait OAuthClient: Send + Sync {
    /// Exchange an authorization code for tokens.
    async fn exchange_code(
        &self,
        request: &TokenExchangeRequest,
    ) -> Result<IssuedToken, TransportError>;

    /// Obtain a new access token with a refresh token.
    async fn refresh(&self, request: &RefreshRequest) -> Result<IssuedToken, TransportError>;

    /// Fetch the account profile; doubles as the session probe.
    async fn profile(&self, client_id: &str, access_token: &str)
    -> Result<ProfileData, TransportError>;

    /// Revoke the access token.
    async fn logout(&self, client_id: &str, access_token: &str) -> Result<(), TransportError>;
}

/// reqwest implementation of [`OAuthClient`].
#[derive(Debug, Clone)]
pub struct HttpOAuthClient {
    client: Client,
    config: OAuthConfig,
}

impl HttpOAuthClient {
    /// Create a client.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Connection` if the HTTP client cannot be built.
    pub fn new(config: OAuthConfig) -> Result<Self, TransportError> {
        Ok(Self {
            client: build_client(config.timeout())?,
            config,
        })
    }

    fn authorization(client_id: &str, access_token: &str) -> String {
        format!("{client_id}:{access_token}")
    }
}

fn issued(response: TokenResponse) -> Result<IssuedToken, TransportError> {
    if response.s.as_deref().is_some_and(|s| !s.eq_ignore_ascii_case("ok")) {
        return Err(TransportError::Rejected(
            response
                .message
                .unwrap_or_else(|| "token request rejected".to_string()),
        ));
    }
    let access_token = response
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| TransportError::Decode("token response missing access_token".into()))?;
    Ok(IssuedToken {
        access_token,
        refresh_token: response.refresh_token.filter(|t| !t.is_empty()),
        expires_in: response.expires_in,
    })
}

#[async_trait]
impl OAuthClient for HttpOAuthClient {
    async fn exchange_code(
        &self,
        request: &TokenExchangeRequest,
    ) -> Result<IssuedToken, TransportError> {
        let response = self
            .client
            .post(self.config.endpoint("validate-authcode"))
            .json(request)
            .send()
            .await?;
        issued(read_json(response).await?)
    }

    async fn refresh(&self, request: &RefreshRequest) -> Result<IssuedToken, TransportError> {
        let response = self
            .client
            .post(self.config.endpoint("validate-refresh-token"))
            .json(request)
            .send()
            .await?;
        issued(read_json(response).await?)
    }

    async fn profile(
        &self,
        client_id: &str,
        access_token: &str,
    ) -> Result<ProfileData, TransportError> {
        let response = self
            .client
            .get(self.config.endpoint("profile"))
            .header(
                reqwest::header::AUTHORIZATION,
                Self::authorization(client_id, access_token),
            )
            .send()
            .await?;
        let body: ProfileResponse = read_json(response).await?;
        if body.s.as_deref().is_some_and(|s| !s.eq_ignore_ascii_case("ok")) {
            return Err(TransportError::Rejected(
                body.message.unwrap_or_else(|| "profile request rejected".to_string()),
            ));
        }
        Ok(body.data.unwrap_or_default())
    }

    async fn logout(&self, client_id: &str, access_token: &str) -> Result<(), TransportError> {
        let response = self
            .client
            .post(self.config.endpoint("logout"))
            .header(
                reqwest::header::AUTHORIZATION,
                Self::authorization(client_id, access_token),
            )
            .send()
            .await?;
        let _: serde_json::Value = read_json(response).await?;
        Ok(())
    }
}
