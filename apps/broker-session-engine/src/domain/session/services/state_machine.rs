//! Session State Machine Service
//!
//! Validates account status transitions for every trigger a session can see.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::session::errors::SessionError;
use crate::domain::session::value_objects::AccountStatus;

/// Event that may move a session between statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionTrigger {
    /// `connect` succeeded.
    Connected,
    /// `completeOAuth` exchanged the code.
    OauthCompleted,
    /// `completeOAuth` was refused (expired or invalid code).
    OauthCodeRejected,
    /// Health probe succeeded.
    ProbeSucceeded,
    /// Health probe was rejected by the broker as an auth failure.
    ProbeRejected,
    /// Access token expired, detected locally or reported by the broker.
    TokenExpiry,
    /// `refreshToken` produced a new token.
    RefreshSucceeded,
    /// `refreshToken` was rejected as an auth failure.
    RefreshRejected,
    /// Explicit `disconnect`.
    Disconnected,
}

impl fmt::Display for SessionTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connected => "CONNECTED",
            Self::OauthCompleted => "OAUTH_COMPLETED",
            Self::OauthCodeRejected => "OAUTH_CODE_REJECTED",
            Self::ProbeSucceeded => "PROBE_SUCCEEDED",
            Self::ProbeRejected => "PROBE_REJECTED",
            Self::TokenExpiry => "TOKEN_EXPIRY",
            Self::RefreshSucceeded => "REFRESH_SUCCEEDED",
            Self::RefreshRejected => "REFRESH_REJECTED",
            Self::Disconnected => "DISCONNECTED",
        };
        f.write_str(name)
    }
}

/// Session state machine for validating transitions.
///
/// A session starts absent (`from == None`). `ACTIVE` and `INACTIVE` end a
/// cycle; both can be re-entered through `connect`.
pub struct SessionStateMachine;

impl SessionStateMachine {
    /// Check if a transition is valid for a trigger.
    #[must_use]
    pub const fn is_valid_transition(
        from: Option<AccountStatus>,
        trigger: SessionTrigger,
        to: AccountStatus,
    ) -> bool {
        use AccountStatus::{Active, Inactive, ProceedToOauth, RefreshRequired, TokenExpired};
        use SessionTrigger as T;

        match trigger {
            // Re-entrant from any state, including absent
            T::Connected => matches!(to, Active | ProceedToOauth),
            // Disconnect always lands in INACTIVE
            T::Disconnected => matches!(to, Inactive),
            T::OauthCompleted => matches!((from, to), (Some(ProceedToOauth) | None, Active)),
            T::OauthCodeRejected => {
                matches!((from, to), (Some(ProceedToOauth) | None, ProceedToOauth))
            }
            T::ProbeSucceeded => matches!((from, to), (Some(Active), Active)),
            T::ProbeRejected => matches!(
                (from, to),
                (Some(Active | TokenExpired | RefreshRequired), Inactive | ProceedToOauth)
            ),
            T::TokenExpiry => matches!(
                (from, to),
                (
                    Some(Active | TokenExpired | RefreshRequired),
                    RefreshRequired | TokenExpired | ProceedToOauth
                )
            ),
            T::RefreshSucceeded => matches!(
                (from, to),
                (Some(Active | TokenExpired | RefreshRequired), Active)
            ),
            T::RefreshRejected => matches!(
                (from, to),
                (Some(Active | TokenExpired | RefreshRequired), Inactive | ProceedToOauth)
            ),
        }
    }

    /// Validate a transition.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidTransition` if the trigger cannot move
    /// the session from `from` to `to`.
    pub fn validate_transition(
        from: Option<AccountStatus>,
        trigger: SessionTrigger,
        to: AccountStatus,
    ) -> Result<(), SessionError> {
        if Self::is_valid_transition(from, trigger, to) {
            Ok(())
        } else {
            Err(SessionError::InvalidTransition {
                from,
                trigger,
                to,
                reason: Self::transition_error_reason(from, trigger, to),
            })
        }
    }

    /// Human-readable reason for an invalid transition.
    #[must_use]
    pub fn transition_error_reason(
        from: Option<AccountStatus>,
        trigger: SessionTrigger,
        to: AccountStatus,
    ) -> String {
        match from {
            None => format!("No session exists, {trigger} cannot produce {to}"),
            Some(AccountStatus::Inactive) => {
                format!("Session is inactive, only CONNECTED can revive it (got {trigger})")
            }
            Some(AccountStatus::ProceedToOauth) => {
                format!("Session is awaiting OAuth consent, {trigger} cannot produce {to}")
            }
            Some(status) => format!("Invalid transition from {status} to {to} on {trigger}"),
        }
    }

    /// All statuses a trigger may produce from `from`.
    #[must_use]
    pub fn valid_next_states(
        from: Option<AccountStatus>,
        trigger: SessionTrigger,
    ) -> Vec<AccountStatus> {
        AccountStatus::ALL
            .into_iter()
            .filter(|to| Self::is_valid_transition(from, trigger, *to))
            .collect()
    }
}
