//! Direct-auth broker adapter implementing `BrokerAdapter`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};

use super::api_types::{LoginRequest, LoginSession};
use super::client::DirectAuthClient;
use super::config::DirectAuthConfig;
use super::totp;
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
pub const DIRECT_BROKER_NAME: &str = "direct";

/// Credential fields `connect` requires.
pub const REQUIRED_FIELDS: &[&str] = &[
    "user_id",
    "password",
    "totp_secret",
    "api_secret",
    "vendor_code",
];

/// Adapter for brokers that log in with a password and a TOTP code.
///
/// Tokens never expire locally and cannot be refreshed; a rejected probe is
/// only remedied by a fresh `connect`.
pub struct DirectAuthAdapter {
    client: Arc<dyn DirectAuthClient>,
    config: DirectAuthConfig,
    cache: SessionCache,
    user_id: Option<String>,
}

impl DirectAuthAdapter {
    /// Create an adapter over `client`.
    #[must_use]
    pub fn new(client: Arc<dyn DirectAuthClient>, config: DirectAuthConfig) -> Self {
        Self {
            client,
            config,
            cache: SessionCache::new(AuthenticationStep::DirectAuth),
            user_id: None,
        }
    }

    fn sha256_hex(input: &str) -> String {
        hex::encode(Sha256::digest(input.as_bytes()))
    }

    /// Build the login payload from credentials and a TOTP code.
    fn login_request(&self, credentials: &Credentials, otp: String) -> LoginRequest {
        let user_id = credentials.get("user_id").unwrap_or_default();
        let api_secret = credentials.get("api_secret").unwrap_or_default();
        LoginRequest {
            uid: user_id.to_string(),
            pwd: Self::sha256_hex(credentials.get("password").unwrap_or_default()),
            factor2: otp,
            vc: credentials.get("vendor_code").unwrap_or_default().to_string(),
            appkey: Self::sha256_hex(&format!("{user_id}|{api_secret}")),
            imei: credentials.get("imei").unwrap_or("abc1234").to_string(),
            apkversion: self.config.app_version.clone(),
            source: self.config.source.clone(),
        }
    }

    fn account_from_login(&self, session: &LoginSession) -> AccountInfo {
        let mut account = AccountInfo::new(
            session.account_id.clone(),
            session.name.clone(),
            self.config.display_name.clone(),
        )
        .with_exchanges(session.exchanges.iter().cloned())
        .with_products(session.products.iter().cloned());
        if let Some(email) = &session.email {
            account = account.with_email(email.clone());
        }
        account
    }

    fn probe_user(&self, credentials: &Credentials) -> Option<String> {
        credentials
            .get("user_id")
            .map(str::to_string)
            .or_else(|| self.user_id.clone())
            .or_else(|| self.cache.account.as_ref().map(|a| a.account_id.as_str().to_string()))
    }

    fn login_failure(&mut self, err: &TransportError) -> ConnectionResult {
        let kind = err.kind();
        tracing::warn!(
            broker = DIRECT_BROKER_NAME,
            error_kind = %kind,
            error = %err,
            "Direct login failed"
        );
        self.cache.reset();
        let response = AuthResponse::failure(
            kind,
            err.to_string(),
            AccountStatus::Inactive,
            AuthenticationStep::ReauthRequired,
        );
        match err.retry_after() {
            Some(wait) => response.with_retry_after(wait),
            None => response,
        }
    }
}

impl std::fmt::Debug for DirectAuthAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectAuthAdapter")
            .field("status", &self.cache.status)
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl BrokerAdapter for DirectAuthAdapter {
    fn broker_name(&self) -> &str {
        DIRECT_BROKER_NAME
    }

    fn auth_flow(&self) -> AuthFlow {
        AuthFlow::Direct
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

        let otp = match totp::current(credentials.get("totp_secret").unwrap_or_default()) {
            Ok(code) => code,
            Err(err) => {
                self.cache.reset();
                return AuthResponse::failure(
                    ErrorKind::ValidationError,
                    err.to_string(),
                    AccountStatus::Inactive,
                    AuthenticationStep::ReauthRequired,
                );
            }
        };

        let request = self.login_request(credentials, otp);
        match self.client.login(&request).await {
            Ok(session) => {
                let account = self.account_from_login(&session);
                let token = TokenInfo::non_expiring(session.token);
                self.user_id = Some(request.uid);
                self.cache.hydrate(
                    AccountStatus::Active,
                    Some(token.clone()),
                    Some(account.clone()),
                );
                self.cache.step = AuthenticationStep::DirectAuth;

                tracing::info!(
                    broker = DIRECT_BROKER_NAME,
                    account_id = %account.account_id,
                    "Direct login succeeded"
                );
                AuthResponse::success(
                    AccountStatus::Active,
                    AuthenticationStep::DirectAuth,
                    "Login successful",
                )
                .with_token(token)
                .with_account(account)
            }
            Err(err) => self.login_failure(&err),
        }
    }

    async fn complete_oauth(&mut self, _auth_code: &str, _credentials: &Credentials) -> OAuthResult {
        AuthResponse::failure(
            ErrorKind::ValidationError,
            "Direct-auth brokers do not use OAuth",
            self.cache.status,
            self.cache.step,
        )
    }

    async fn refresh_token(&mut self, _credentials: &Credentials) -> RefreshResult {
        match self.cache.token.clone() {
            Some(token) if token.expires_at().is_none() => AuthResponse::success(
                self.cache.status,
                self.cache.step,
                "Token does not expire, nothing to refresh",
            )
            .with_token(token),
            _ => AuthResponse::failure(
                ErrorKind::RefreshTokenExpired,
                "Direct-auth sessions cannot be refreshed",
                AccountStatus::Inactive,
                AuthenticationStep::ReauthRequired,
            ),
        }
    }

    async fn validate_session(&mut self, credentials: &Credentials) -> ValidationResult {
        if let Some(expired) = self
            .cache
            .check_local_expiry(Utc::now(), AccountStatus::TokenExpired)
        {
            return expired;
        }

        let (Some(token), Some(user_id)) = (
            self.cache.access_token().map(str::to_string),
            self.probe_user(credentials),
        ) else {
            return AuthResponse::failure(
                ErrorKind::AuthFailed,
                "No active session",
                AccountStatus::Inactive,
                AuthenticationStep::ReauthRequired,
            );
        };

        match self.client.user_details(&user_id, &token).await {
            Ok(_) => {
                self.cache.status = AccountStatus::Active;
                let mut response = AuthResponse::success(
                    AccountStatus::Active,
                    self.cache.step,
                    "Session valid",
                );
                if let Some(account) = self.cache.account.clone() {
                    response = response.with_account(account);
                }
                response
            }
            Err(err) => {
                let kind = err.kind();
                if kind.is_auth_failure() {
                    tracing::warn!(
                        broker = DIRECT_BROKER_NAME,
                        error_kind = %kind,
                        "Direct session rejected by broker"
                    );
                    self.cache.reset();
                    AuthResponse::failure(
                        kind,
                        err.to_string(),
                        AccountStatus::Inactive,
                        AuthenticationStep::ReauthRequired,
                    )
                } else {
                    let response = AuthResponse::failure(
                        kind,
                        err.to_string(),
                        self.cache.status,
                        self.cache.step,
                    );
                    match err.retry_after() {
                        Some(wait) => response.with_retry_after(wait),
                        None => response,
                    }
                }
            }
        }
    }

    async fn disconnect(&mut self) -> bool {
        let logged_out = match (self.cache.access_token(), self.probe_user(&Credentials::new())) {
            (Some(token), Some(user_id)) => {
                match self.client.logout(&user_id, token).await {
                    Ok(()) => true,
                    Err(err) => {
                        tracing::warn!(
                            broker = DIRECT_BROKER_NAME,
                            error = %err,
                            "Direct logout failed, clearing local session anyway"
                        );
                        false
                    }
                }
            }
            _ => true,
        };
        self.cache.reset();
        self.user_id = None;
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

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use parking_lot::Mutex;

    use super::*;
    use crate::infrastructure::brokers::direct::api_types::UserProfile;

    #[derive(Default)]
    struct FakeClient {
        login_result: Mutex<Option<Result<LoginSession, TransportError>>>,
        probe_result: Mutex<Option<Result<UserProfile, TransportError>>>,
        last_login: Mutex<Option<LoginRequest>>,
        logins: AtomicU32,
        probes: AtomicU32,
        logouts: AtomicU32,
    }

    #[async_trait]
    impl DirectAuthClient for FakeClient {
        async fn login(&self, request: &LoginRequest) -> Result<LoginSession, TransportError> {
            self.logins.fetch_add(1, Ordering::SeqCst);
            *self.last_login.lock() = Some(request.clone());
            self.login_result
                .lock()
                .clone()
                .unwrap_or_else(|| Err(TransportError::Timeout))
        }

        async fn user_details(&self, _: &str, _: &str) -> Result<UserProfile, TransportError> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            self.probe_result
                .lock()
                .clone()
                .unwrap_or_else(|| Err(TransportError::Timeout))
        }

        async fn logout(&self, _: &str, _: &str) -> Result<(), TransportError> {
            self.logouts.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::Connection("down".into()))
        }
    }

    fn credentials() -> Credentials {
        Credentials::new()
            .with("user_id", "FA1")
            .with("password", "secret")
            .with("totp_secret", "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ")
            .with("api_secret", "api")
            .with("vendor_code", "FA1_U")
    }

    fn session() -> LoginSession {
        LoginSession {
            token: "tok-1".into(),
            account_id: "FA1".into(),
            name: "Jane".into(),
            email: None,
            exchanges: vec!["NSE".into()],
            products: vec!["C".into()],
        }
    }

    fn adapter(client: &Arc<FakeClient>) -> DirectAuthAdapter {
        let client: Arc<dyn DirectAuthClient> = client.clone();
        DirectAuthAdapter::new(client, DirectAuthConfig::default())
    }

    #[tokio::test]
    async fn connect_hashes_secrets_and_activates() {
        let client = Arc::new(FakeClient::default());
        *client.login_result.lock() = Some(Ok(session()));
        let mut adapter = adapter(&client);

        let result = adapter.connect(&credentials()).await;

        assert!(result.success);
        assert_eq!(result.account_status, AccountStatus::Active);
        assert_eq!(result.authentication_step, AuthenticationStep::DirectAuth);
        let token = result.token_info.unwrap();
        assert!(!token.can_refresh);
        assert!(token.expires_at().is_none());

        let sent = client.last_login.lock().clone().unwrap();
        assert_eq!(sent.pwd, DirectAuthAdapter::sha256_hex("secret"));
        assert_eq!(sent.appkey, DirectAuthAdapter::sha256_hex("FA1|api"));
        assert_eq!(sent.factor2.len(), 6);
        assert!(adapter.is_connected());
    }

    #[tokio::test]
    async fn connect_with_missing_fields_makes_no_call() {
        let client = Arc::new(FakeClient::default());
        let mut adapter = adapter(&client);

        let result = adapter
            .connect(&Credentials::new().with("user_id", "FA1"))
            .await;

        assert_eq!(result.error_kind, Some(ErrorKind::ValidationError));
        assert_eq!(result.account_status, AccountStatus::Inactive);
        assert_eq!(result.authentication_step, AuthenticationStep::ReauthRequired);
        assert_eq!(client.logins.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejected_login_is_classified() {
        let client = Arc::new(FakeClient::default());
        *client.login_result.lock() = Some(Err(TransportError::Rejected(
            "Invalid Input : Wrong Password".into(),
        )));
        let mut adapter = adapter(&client);

        let result = adapter.connect(&credentials()).await;
        assert_eq!(result.error_kind, Some(ErrorKind::AuthFailed));
        assert_eq!(result.account_status, AccountStatus::Inactive);
    }

    #[tokio::test]
    async fn validation_leaves_account_profile_untouched() {
        let client = Arc::new(FakeClient::default());
        *client.probe_result.lock() = Some(Ok(UserProfile {
            account_id: Some("FA1".into()),
            name: Some("Jane".into()),
            email: Some("jane@example.com".into()),
            exchanges: vec!["NSE".into(), "MCX".into()],
        }));
        let mut adapter = adapter(&client);
        let account = AccountInfo::new("FA1", "Jane", "Direct Broker").with_exchanges(["NSE"]);
        adapter.hydrate(
            AccountStatus::Active,
            Some(TokenInfo::non_expiring("tok-1")),
            Some(account.clone()),
        );

        let result = adapter.validate_session(&credentials()).await;

        assert!(result.success);
        assert_eq!(result.account_info.as_ref(), Some(&account));
        assert_eq!(adapter.account_info(), Some(&account));
    }

    #[tokio::test]
    async fn probe_network_failure_keeps_status() {
        let client = Arc::new(FakeClient::default());
        let mut adapter = adapter(&client);
        adapter.hydrate(
            AccountStatus::Active,
            Some(TokenInfo::non_expiring("tok-1")),
            None,
        );

        let result = adapter.validate_session(&credentials()).await;
        assert_eq!(result.error_kind, Some(ErrorKind::NetworkError));
        assert_eq!(result.account_status, AccountStatus::Active);
        assert!(adapter.is_connected());
    }

    #[tokio::test]
    async fn probe_auth_failure_demotes_to_inactive() {
        let client = Arc::new(FakeClient::default());
        *client.probe_result.lock() = Some(Err(TransportError::Rejected(
            "Session Expired :  Invalid Session Key".into(),
        )));
        let mut adapter = adapter(&client);
        adapter.hydrate(
            AccountStatus::Active,
            Some(TokenInfo::non_expiring("tok-1")),
            None,
        );

        let result = adapter.validate_session(&credentials()).await;
        assert_eq!(result.error_kind, Some(ErrorKind::TokenExpired));
        assert_eq!(result.account_status, AccountStatus::Inactive);
        assert_eq!(result.authentication_step, AuthenticationStep::ReauthRequired);
        assert!(!adapter.is_connected());
    }

    #[tokio::test]
    async fn refresh_is_noop_for_non_expiring_token() {
        let client = Arc::new(FakeClient::default());
        let mut adapter = adapter(&client);
        adapter.hydrate(
            AccountStatus::Active,
            Some(TokenInfo::non_expiring("tok-1")),
            None,
        );
        let result = adapter.refresh_token(&credentials()).await;
        assert!(result.success);
        assert_eq!(client.logins.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn complete_oauth_is_validation_error() {
        let client = Arc::new(FakeClient::default());
        let mut adapter = adapter(&client);
        let result = adapter.complete_oauth("code", &credentials()).await;
        assert_eq!(result.error_kind, Some(ErrorKind::ValidationError));
    }

    #[tokio::test]
    async fn disconnect_resets_even_when_logout_fails() {
        let client = Arc::new(FakeClient::default());
        *client.login_result.lock() = Some(Ok(session()));
        let mut adapter = adapter(&client);
        adapter.connect(&credentials()).await;

        let logged_out = adapter.disconnect().await;

        assert!(!logged_out);
        assert_eq!(client.logouts.load(Ordering::SeqCst), 1);
        assert!(!adapter.is_connected());
        assert_eq!(adapter.account_status(), AccountStatus::Inactive);
    }
}
