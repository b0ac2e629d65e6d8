//! Per-adapter cache of the store's session view.

use chrono::{DateTime, Utc};

use crate::application::ports::AuthResponse;
use crate::domain::session::{
    AccountInfo, AccountStatus, AuthenticationStep, ErrorKind, TokenInfo,
};

/// Status, token and profile an adapter works against.
///
/// Hydrated from the session store before each operation; the store's copy
/// stays authoritative.
#[derive(Debug, Clone)]
pub struct SessionCache {
    /// Cached status.
    pub status: AccountStatus,
    /// Cached step.
    pub step: AuthenticationStep,
    /// Cached token.
    pub token: Option<TokenInfo>,
    /// Cached profile.
    pub account: Option<AccountInfo>,
}

impl SessionCache {
    /// Empty cache in `INACTIVE`.
    #[must_use]
    pub const fn new(step: AuthenticationStep) -> Self {
        Self {
            status: AccountStatus::Inactive,
            step,
            token: None,
            account: None,
        }
    }

    /// Load the store's view.
    pub fn hydrate(
        &mut self,
        status: AccountStatus,
        token: Option<TokenInfo>,
        account: Option<AccountInfo>,
    ) {
        self.status = status;
        self.token = token;
        self.account = account;
    }

    /// Drop everything and return to `INACTIVE`.
    pub fn reset(&mut self) {
        self.status = AccountStatus::Inactive;
        self.step = AuthenticationStep::ReauthRequired;
        self.token = None;
        self.account = None;
    }

    /// Whether the cache holds a usable session.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self.status, AccountStatus::Active) && self.token.is_some()
    }

    /// Access token, if any.
    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.token.as_ref().and_then(|t| t.access_token.as_deref())
    }

    /// Local expiry check run before any probe.
    ///
    /// Returns the failure envelope when the cached token has expired at
    /// `now`: `REFRESH_REQUIRED` when a refresh can recover it, otherwise
    /// `unrecoverable` with `REAUTH_REQUIRED`. The cache is updated to match.
    pub fn check_local_expiry(
        &mut self,
        now: DateTime<Utc>,
        unrecoverable: AccountStatus,
    ) -> Option<AuthResponse> {
        let token = self.token.as_ref()?;
        if !token.is_expired_at(now) {
            return None;
        }

        let (status, step, message) = if token.refreshable() {
            (
                AccountStatus::RefreshRequired,
                AuthenticationStep::TokenRefresh,
                "Access token expired, refresh required",
            )
        } else {
            (
                unrecoverable,
                AuthenticationStep::ReauthRequired,
                "Access token expired and cannot be refreshed",
            )
        };
        self.status = status;
        self.step = step;
        Some(AuthResponse::failure(ErrorKind::TokenExpired, message, status, step))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn expired_refreshable_token_requires_refresh() {
        let now = Utc::now();
        let mut cache = SessionCache::new(AuthenticationStep::OauthCompletion);
        cache.hydrate(
            AccountStatus::Active,
            Some(TokenInfo::expiring(
                "a",
                Some("r".into()),
                now - Duration::seconds(1),
            )),
            None,
        );

        let response = cache
            .check_local_expiry(now, AccountStatus::ProceedToOauth)
            .unwrap();
        assert_eq!(response.account_status, AccountStatus::RefreshRequired);
        assert_eq!(response.authentication_step, AuthenticationStep::TokenRefresh);
        assert_eq!(response.error_kind, Some(ErrorKind::TokenExpired));
    }

    #[test]
    fn expired_unrefreshable_token_requires_reauth() {
        let now = Utc::now();
        let mut cache = SessionCache::new(AuthenticationStep::OauthCompletion);
        cache.hydrate(
            AccountStatus::Active,
            Some(TokenInfo::expiring("a", None, now - Duration::seconds(1))),
            None,
        );

        let response = cache
            .check_local_expiry(now, AccountStatus::ProceedToOauth)
            .unwrap();
        assert_eq!(response.account_status, AccountStatus::ProceedToOauth);
        assert_eq!(response.authentication_step, AuthenticationStep::ReauthRequired);
        assert_eq!(cache.status, AccountStatus::ProceedToOauth);
    }

    #[test]
    fn live_or_non_expiring_token_passes() {
        let now = Utc::now();
        let mut cache = SessionCache::new(AuthenticationStep::DirectAuth);
        cache.hydrate(AccountStatus::Active, Some(TokenInfo::non_expiring("t")), None);
        assert!(cache.check_local_expiry(now, AccountStatus::Inactive).is_none());
        assert!(cache.is_connected());

        cache.reset();
        assert!(!cache.is_connected());
        assert_eq!(cache.status, AccountStatus::Inactive);
    }
}
