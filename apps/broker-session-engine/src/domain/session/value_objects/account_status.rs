//! Account status and the authentication step a caller must take next.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a broker session.
///
/// Exactly one status holds per session at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    /// Session is authenticated and usable for trading.
    Active,
    /// Session is unusable until a fresh `connect`.
    Inactive,
    /// Waiting for the user to complete the broker's OAuth consent.
    ProceedToOauth,
    /// Token has expired and no automatic recovery has been attempted yet.
    TokenExpired,
    /// Token has expired and a refresh call is expected to recover it.
    RefreshRequired,
}

impl AccountStatus {
    /// All statuses, in display order.
    pub const ALL: [Self; 5] = [
        Self::Active,
        Self::Inactive,
        Self::ProceedToOauth,
        Self::TokenExpired,
        Self::RefreshRequired,
    ];

    /// Returns true if the supervisor should keep validating this session.
    #[must_use]
    pub const fn is_supervised(&self) -> bool {
        matches!(
            self,
            Self::Active | Self::TokenExpired | Self::RefreshRequired
        )
    }

    /// Returns true if the session needs a token refresh to recover.
    #[must_use]
    pub const fn needs_refresh(&self) -> bool {
        matches!(self, Self::TokenExpired | Self::RefreshRequired)
    }

    /// Returns true if recovery requires the user to act.
    #[must_use]
    pub const fn requires_user_action(&self) -> bool {
        matches!(self, Self::Inactive | Self::ProceedToOauth)
    }

    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
            Self::ProceedToOauth => "PROCEED_TO_OAUTH",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::RefreshRequired => "REFRESH_REQUIRED",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The operation a caller must invoke next to make progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthenticationStep {
    /// Direct login completed (or must be performed) via `connect`.
    DirectAuth,
    /// User must visit the authorization URL and return an auth code.
    OauthRequired,
    /// OAuth code exchange completed.
    OauthCompletion,
    /// A token refresh is expected next.
    TokenRefresh,
    /// Only a fresh `connect` by the user can recover the session.
    ReauthRequired,
}

impl AuthenticationStep {
    /// Wire name of the step.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DirectAuth => "DIRECT_AUTH",
            Self::OauthRequired => "OAUTH_REQUIRED",
            Self::OauthCompletion => "OAUTH_COMPLETION",
            Self::TokenRefresh => "TOKEN_REFRESH",
            Self::ReauthRequired => "REAUTH_REQUIRED",
        }
    }
}

impl fmt::Display for AuthenticationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&AccountStatus::ProceedToOauth).unwrap();
        assert_eq!(json, "\"PROCEED_TO_OAUTH\"");
        let parsed: AccountStatus = serde_json::from_str("\"REFRESH_REQUIRED\"").unwrap();
        assert_eq!(parsed, AccountStatus::RefreshRequired);
    }

    #[test]
    fn supervised_statuses() {
        assert!(AccountStatus::Active.is_supervised());
        assert!(AccountStatus::RefreshRequired.is_supervised());
        assert!(AccountStatus::TokenExpired.is_supervised());
        assert!(!AccountStatus::Inactive.is_supervised());
        assert!(!AccountStatus::ProceedToOauth.is_supervised());
    }

    #[test]
    fn display_matches_wire_name() {
        for status in AccountStatus::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json.trim_matches('"'), status.to_string());
        }
        assert_eq!(AuthenticationStep::ReauthRequired.to_string(), "REAUTH_REQUIRED");
    }
}
