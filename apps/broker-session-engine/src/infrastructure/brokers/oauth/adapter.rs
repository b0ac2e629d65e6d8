//! OAuth broker adapter implementing `BrokerAdapter`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use super::api_types::{IssuedToken, RefreshRequest, TokenExchangeRequest};
use super::client::OAuthClient;
use super::config::OAuthConfig;
use super::signing::{app_id_hash, refresh_signature};
use crate::application::ports::{
    AuthFlow, AuthResponse, BrokerAdapter, ConnectionResult, Credentials, OAuthResult,
    RefreshResult, ValidationResult,
};
use crate::domain::session::{
    AccountInfo, AccountStatus, AuthenticationStep, ErrorKind, TokenInfo,
};
use crate::infrastructure::brokers::error::TransportError;
use crate::infrastructure::brokers::session_cache::SessionCache;

/// Registered plugin name.
pub const OAUTH_BROKER_NAME: &str = "oauth";

/// Credential fields `connect` requires.
pub const REQUIRED_FIELDS: &[&str] = &["client_id", "secret_key", "redirect_uri"];

/// Adapter for brokers using an authorization-code grant with refreshable
/// tokens.
pub struct OAuthAdapter {
    client: Arc<dyn OAuthClient>,
    config: OAuthConfig,
    cache: SessionCache,
    client_id: Option<String>,
}

impl OAuthAdapter {
    /// Create an adapter over `client`.
    #[must_use]
    pub fn new(client: Arc<dyn OAuthClient>, config: OAuthConfig) -> Self {
        Self {
            client,
            config,
            cache: SessionCache::new(AuthenticationStep::OauthRequired),
            client_id: None,
        }
    }

    /// Consent URL for `credentials`.
    fn authorization_url(&self, credentials: &Credentials) -> Result<String, String> {
        let state = credentials
            .get("state")
            .map_or_else(|| uuid::Uuid::new_v4().simple().to_string(), str::to_string);
        reqwest::Url::parse_with_params(
            &self.config.authorize_url,
            &[
                ("client_id", credentials.get("client_id").unwrap_or_default()),
                (
                    "redirect_uri",
                    credentials.get("redirect_uri").unwrap_or_default(),
                ),
                ("response_type", "code"),
                ("state", state.as_str()),
            ],
        )
        .map(String::from)
        .map_err(|e| format!("Invalid authorization URL: {e}"))
    }

    fn token_from(&self, issued: IssuedToken, previous_refresh: Option<String>) -> TokenInfo {
        let lifetime = issued
            .expires_in
            .filter(|secs| *secs > 0)
            .map_or_else(|| self.config.default_token_lifetime(), Duration::seconds);
        TokenInfo::expiring(
            issued.access_token,
            issued.refresh_token.or(previous_refresh),
            Utc::now() + lifetime,
        )
    }

    fn client_id_for(&self, credentials: &Credentials) -> Option<String> {
        credentials
            .get("client_id")
            .map(str::to_string)
            .or_else(|| self.client_id.clone())
    }

    fn failure_with_hint(
        err: &TransportError,
        kind: ErrorKind,
        status: AccountStatus,
        step: AuthenticationStep,
    ) -> AuthResponse {
        let response = AuthResponse::failure(kind, err.to_string(), status, step);
        match err.retry_after() {
            Some(wait) => response.with_retry_after(wait),
            None => response,
        }
    }

    fn oauth_required(kind: ErrorKind, message: impl Into<String>) -> AuthResponse {
        AuthResponse::failure(
            kind,
            message,
            AccountStatus::ProceedToOauth,
            AuthenticationStep::OauthRequired,
        )
    }
}

impl std::fmt::Debug for OAuthAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthAdapter")
            .field("status", &self.cache.status)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl BrokerAdapter for OAuthAdapter {
    fn broker_name(&self) -> &str {
        OAUTH_BROKER_NAME
    }

    fn auth_flow(&self) -> AuthFlow {
        AuthFlow::Oauth
    }

    fn hydrate(
        &mut self,
        status: AccountStatus,
        token_info: Option<TokenInfo>,
        account_info: Option<AccountInfo>,
    ) {
        self.cache.hydrate(status, token_info, account_info);
    }

    async fn connect(&mut self, credentials: &Credentials) -> ConnectionResult {
        let missing = credentials.missing(REQUIRED_FIELDS);
        if !missing.is_empty() {
            self.cache.reset();
            return AuthResponse::failure(
                ErrorKind::ValidationError,
                format!("Missing credentials: {}", missing.join(", ")),
                AccountStatus::Inactive,
                AuthenticationStep::ReauthRequired,
            );
        }

        match self.authorization_url(credentials) {
            Ok(url) => {
                self.client_id = credentials.get("client_id").map(str::to_string);
                self.cache.reset();
                self.cache.status = AccountStatus::ProceedToOauth;
                self.cache.step = AuthenticationStep::OauthRequired;

                tracing::info!(
                    broker = OAUTH_BROKER_NAME,
                    "Authorization URL issued, waiting for user consent"
                );
                AuthResponse::success(
                    AccountStatus::ProceedToOauth,
                    AuthenticationStep::OauthRequired,
                    "Visit the authorization URL to grant access",
                )
                .with_authorization_url(url)
            }
            Err(message) => {
                self.cache.reset();
                AuthResponse::failure(
                    ErrorKind::ValidationError,
                    message,
                    AccountStatus::Inactive,
                    AuthenticationStep::ReauthRequired,
                )
            }
        }
    }

    async fn complete_oauth(&mut self, auth_code: &str, credentials: &Credentials) -> OAuthResult {
        if auth_code.trim().is_empty() {
            return Self::oauth_required(ErrorKind::ValidationError, "Authorization code is empty");
        }
        let missing = credentials.missing(&["client_id", "secret_key"]);
        if !missing.is_empty() {
            return Self::oauth_required(
                ErrorKind::ValidationError,
                format!("Missing credentials: {}", missing.join(", ")),
            );
        }
        let client_id = credentials.get("client_id").unwrap_or_default().to_string();
        let secret_key = credentials.get("secret_key").unwrap_or_default();

        let request = TokenExchangeRequest {
            grant_type: "authorization_code".to_string(),
            app_id_hash: app_id_hash(&client_id, secret_key),
            code: auth_code.trim().to_string(),
        };

        let issued = match self.client.exchange_code(&request).await {
            Ok(issued) => issued,
            Err(err) => {
                let kind = match err.kind() {
                    ErrorKind::AuthFailed
                    | ErrorKind::TokenExpired
                    | ErrorKind::RefreshTokenExpired
                    | ErrorKind::ValidationError => ErrorKind::AuthCodeExpired,
                    other => other,
                };
                tracing::warn!(
                    broker = OAUTH_BROKER_NAME,
                    error_kind = %kind,
                    error = %err,
                    "Authorization code exchange failed"
                );
                self.cache.status = AccountStatus::ProceedToOauth;
                self.cache.step = AuthenticationStep::OauthRequired;
                return Self::failure_with_hint(
                    &err,
                    kind,
                    AccountStatus::ProceedToOauth,
                    AuthenticationStep::OauthRequired,
                );
            }
        };

        let token = self.token_from(issued, None);
        let access_token = token.access_token.clone().unwrap_or_default();

        let account = match self.client.profile(&client_id, &access_token).await {
            Ok(profile) => {
                let id = profile.client_id.unwrap_or_else(|| client_id.clone());
                let name = profile.name.unwrap_or_else(|| id.clone());
                let account = AccountInfo::new(id, name, self.config.display_name.clone());
                match profile.email {
                    Some(email) => account.with_email(email),
                    None => account,
                }
            }
            Err(err) => {
                tracing::debug!(
                    broker = OAUTH_BROKER_NAME,
                    error = %err,
                    "Profile enrichment failed, using credential fallback"
                );
                AccountInfo::new(
                    client_id.clone(),
                    client_id.clone(),
                    self.config.display_name.clone(),
                )
            }
        };

        self.client_id = Some(client_id);
        self.cache
            .hydrate(AccountStatus::Active, Some(token.clone()), Some(account.clone()));
        self.cache.step = AuthenticationStep::OauthCompletion;

        tracing::info!(
            broker = OAUTH_BROKER_NAME,
            account_id = %account.account_id,
            expires_at = ?token.expires_at(),
            "OAuth authorization completed"
        );
        AuthResponse::success(
            AccountStatus::Active,
            AuthenticationStep::OauthCompletion,
            "Authorization completed",
        )
        .with_token(token)
        .with_account(account)
    }

    async fn refresh_token(&mut self, credentials: &Credentials) -> RefreshResult {
        let Some(current) = self.cache.token.clone() else {
            return AuthResponse::failure(
                ErrorKind::RefreshTokenExpired,
                "No token to refresh",
                AccountStatus::ProceedToOauth,
                AuthenticationStep::ReauthRequired,
            );
        };
        if current.expires_at().is_none() {
            return AuthResponse::success(
                self.cache.status,
                self.cache.step,
                "Token does not expire, nothing to refresh",
            )
            .with_token(current);
        }
        let Some(refresh_token) = current
            .refresh_token
            .clone()
            .filter(|_| current.refreshable())
        else {
            self.cache.status = AccountStatus::ProceedToOauth;
            self.cache.step = AuthenticationStep::ReauthRequired;
            return AuthResponse::failure(
                ErrorKind::RefreshTokenExpired,
                "Refresh is not possible, re-authorization required",
                AccountStatus::ProceedToOauth,
                AuthenticationStep::ReauthRequired,
            );
        };

        let (Some(client_id), Some(secret_key)) =
            (self.client_id_for(credentials), credentials.get("secret_key"))
        else {
            return AuthResponse::failure(
                ErrorKind::ValidationError,
                "Missing credentials: client_id, secret_key",
                self.cache.status,
                AuthenticationStep::TokenRefresh,
            );
        };

        let request = RefreshRequest {
            grant_type: "refresh_token".to_string(),
            app_id_hash: app_id_hash(&client_id, secret_key),
            refresh_token: refresh_token.clone(),
            signature: refresh_signature(&client_id, secret_key),
            pin: credentials.get("pin").map(str::to_string),
        };

        match self.client.refresh(&request).await {
            Ok(issued) => {
                let token = self.token_from(issued, Some(refresh_token));
                self.cache.token = Some(token.clone());
                self.cache.status = AccountStatus::Active;
                self.cache.step = AuthenticationStep::OauthCompletion;

                tracing::info!(
                    broker = OAUTH_BROKER_NAME,
                    expires_at = ?token.expires_at(),
                    "Access token refreshed"
                );
                AuthResponse::success(
                    AccountStatus::Active,
                    AuthenticationStep::OauthCompletion,
                    "Token refreshed",
                )
                .with_token(token)
            }
            Err(err) => {
                let kind = err.kind();
                if kind.is_auth_failure() || kind.is_non_retryable() {
                    tracing::warn!(
                        broker = OAUTH_BROKER_NAME,
                        error_kind = %kind,
                        "Refresh rejected, re-authorization required"
                    );
                    if let Some(token) = self.cache.token.as_mut() {
                        token.revoke_refresh();
                    }
                    self.cache.status = AccountStatus::ProceedToOauth;
                    self.cache.step = AuthenticationStep::ReauthRequired;
                    Self::failure_with_hint(
                        &err,
                        ErrorKind::RefreshTokenExpired,
                        AccountStatus::ProceedToOauth,
                        AuthenticationStep::ReauthRequired,
                    )
                } else {
                    tracing::debug!(
                        broker = OAUTH_BROKER_NAME,
                        error_kind = %kind,
                        "Refresh failed transiently, keeping refresh token"
                    );
                    Self::failure_with_hint(
                        &err,
                        kind,
                        self.cache.status,
                        AuthenticationStep::TokenRefresh,
                    )
                }
            }
        }
    }

    async fn validate_session(&mut self, credentials: &Credentials) -> ValidationResult {
        if let Some(expired) = self
            .cache
            .check_local_expiry(Utc::now(), AccountStatus::ProceedToOauth)
        {
            return expired;
        }

        let Some(access_token) = self.cache.access_token().map(str::to_string) else {
            return Self::oauth_required(ErrorKind::AuthFailed, "No active session");
        };
        let Some(client_id) = self.client_id_for(credentials) else {
            return AuthResponse::failure(
                ErrorKind::ValidationError,
                "Missing credentials: client_id",
                self.cache.status,
                self.cache.step,
            );
        };

        match self.client.profile(&client_id, &access_token).await {
            Ok(_) => {
                self.cache.status = AccountStatus::Active;
                let mut response =
                    AuthResponse::success(AccountStatus::Active, self.cache.step, "Session valid");
                if let Some(account) = self.cache.account.clone() {
                    response = response.with_account(account);
                }
                response
            }
            Err(err) => {
                let kind = err.kind();
                let refreshable = self.cache.token.as_ref().is_some_and(TokenInfo::refreshable);
                if kind == ErrorKind::TokenExpired && refreshable {
                    tracing::info!(
                        broker = OAUTH_BROKER_NAME,
                        "Broker reported access token expired, refresh required"
                    );
                    self.cache.status = AccountStatus::RefreshRequired;
                    self.cache.step = AuthenticationStep::TokenRefresh;
                    Self::failure_with_hint(
                        &err,
                        kind,
                        AccountStatus::RefreshRequired,
                        AuthenticationStep::TokenRefresh,
                    )
                } else if kind.is_auth_failure() {
                    tracing::warn!(
                        broker = OAUTH_BROKER_NAME,
                        error_kind = %kind,
                        "OAuth session rejected by broker"
                    );
                    self.cache.status = AccountStatus::ProceedToOauth;
                    self.cache.step = AuthenticationStep::OauthRequired;
                    Self::failure_with_hint(
                        &err,
                        kind,
                        AccountStatus::ProceedToOauth,
                        AuthenticationStep::OauthRequired,
                    )
                } else {
                    Self::failure_with_hint(&err, kind, self.cache.status, self.cache.step)
                }
            }
        }
    }

    async fn disconnect(&mut self) -> bool {
        let logged_out = match (self.cache.access_token(), self.client_id.as_deref()) {
            (Some(token), Some(client_id)) => match self.client.logout(client_id, token).await {
                Ok(()) => true,
                Err(err) => {
                    tracing::warn!(
                        broker = OAUTH_BROKER_NAME,
                        error = %err,
                        "OAuth logout failed, clearing local session anyway"
                    );
                    false
                }
            },
            _ => true,
        };
        self.cache.reset();
        self.client_id = None;
        logged_out
    }

    fn is_connected(&self) -> bool {
        self.cache.is_connected()
    }

    fn account_status(&self) -> AccountStatus {
        self.cache.status
    }

    fn token_info(&self) -> Option<&TokenInfo> {
        self.cache.token.as_ref()
    }

    fn account_info(&self) -> Option<&AccountInfo> {
        self.cache.account.as_ref()
    }
}
