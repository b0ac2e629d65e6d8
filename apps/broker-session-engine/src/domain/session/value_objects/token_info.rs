//! Token material held for a session.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// When a token stops being accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "at", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenExpiry {
    /// The broker never expires the token; only a failed probe invalidates it.
    Never,
    /// The token expires at the given instant.
    At(DateTime<Utc>),
}

/// Access/refresh token pair plus expiry metadata.
///
/// Token values never appear in `Debug` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    /// Bearer or session token used for broker calls.
    pub access_token: Option<String>,
    /// Token used to obtain a new access token.
    pub refresh_token: Option<String>,
    /// Expiry of the access token.
    pub expiry: TokenExpiry,
    /// Whether a refresh call can recover an expired access token.
    pub can_refresh: bool,
}

impl TokenInfo {
    /// Token issued by a broker that never expires it and cannot refresh it.
    #[must_use]
    pub fn non_expiring(access_token: impl Into<String>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            refresh_token: None,
            expiry: TokenExpiry::Never,
            can_refresh: false,
        }
    }

    /// Token with a finite lifetime. Refresh is possible only when a refresh
    /// token was issued.
    #[must_use]
    pub fn expiring(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let can_refresh = refresh_token.is_some();
        Self {
            access_token: Some(access_token.into()),
            refresh_token,
            expiry: TokenExpiry::At(expires_at),
            can_refresh,
        }
    }

    /// Expiry instant, if the token expires at all.
    #[must_use]
    pub const fn expires_at(&self) -> Option<DateTime<Utc>> {
        match self.expiry {
            TokenExpiry::Never => None,
            TokenExpiry::At(at) => Some(at),
        }
    }

    /// Whether the token has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            TokenExpiry::Never => false,
            TokenExpiry::At(at) => now >= at,
        }
    }

    /// Whether the token has expired now.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Remaining lifetime at `now`. `None` for non-expiring tokens.
    #[must_use]
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expires_at().map(|at| at - now)
    }

    /// Whether a refresh call may be attempted.
    #[must_use]
    pub const fn refreshable(&self) -> bool {
        self.can_refresh && self.refresh_token.is_some()
    }

    /// Drop the refresh path after a permanent refresh failure.
    pub fn revoke_refresh(&mut self) {
        self.refresh_token = None;
        self.can_refresh = false;
    }
}

impl fmt::Debug for TokenInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenInfo")
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expiry", &self.expiry)
            .field("can_refresh", &self.can_refresh)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_expiring_token_never_expires() {
        let token = TokenInfo::non_expiring("abc");
        assert!(!token.is_expired_at(Utc::now() + Duration::days(3650)));
        assert!(!token.can_refresh);
        assert!(token.remaining_at(Utc::now()).is_none());
    }

    #[test]
    fn expiring_token_expires_at_boundary() {
        let now = Utc::now();
        let token = TokenInfo::expiring("abc", Some("r".into()), now);
        assert!(token.is_expired_at(now));
        assert!(!token.is_expired_at(now - Duration::seconds(1)));
        assert!(token.refreshable());
    }

    #[test]
    fn expiring_without_refresh_token_cannot_refresh() {
        let token = TokenInfo::expiring("abc", None, Utc::now());
        assert!(!token.can_refresh);
        assert!(!token.refreshable());
    }

    #[test]
    fn revoke_refresh_clears_refresh_path() {
        let mut token = TokenInfo::expiring("abc", Some("r".into()), Utc::now());
        token.revoke_refresh();
        assert!(!token.refreshable());
        assert!(token.refresh_token.is_none());
    }

    #[test]
    fn debug_redacts_tokens() {
        let token = TokenInfo::expiring("secret-access", Some("secret-refresh".into()), Utc::now());
        let rendered = format!("{token:?}");
        assert!(!rendered.contains("secret-access"));
        assert!(!rendered.contains("secret-refresh"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
