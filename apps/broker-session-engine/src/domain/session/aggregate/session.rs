//! Session Aggregate Root
//!
//! One live broker session, identified by `(user, broker, account)`.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::session::errors::SessionError;
use crate::domain::session::services::{SessionStateMachine, SessionTrigger};
use crate::domain::session::value_objects::{
    AccountInfo, AccountStatus, AuthenticationStep, ErrorKind, ErrorRecord, HealthPolicy,
    MAX_HEALTH_SCORE, SessionKey, TokenInfo,
};

/// Outcome of a health bookkeeping update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthChange {
    /// Score before the update.
    pub previous_score: f64,
    /// Score after the update.
    pub score: f64,
    /// Failure streak after the update.
    pub consecutive_failures: u32,
}

impl HealthChange {
    /// True if the score moved from at-or-above `threshold` to below it.
    #[must_use]
    pub fn crossed_below(&self, threshold: f64) -> bool {
        self.previous_score >= threshold && self.score < threshold
    }
}

/// Session aggregate.
///
/// Owned exclusively by the session store. Adapters cache tokens but the
/// store's copy is authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    key: SessionKey,
    status: AccountStatus,
    authentication_step: AuthenticationStep,
    token_info: Option<TokenInfo>,
    account_info: Option<AccountInfo>,
    connected_at: DateTime<Utc>,
    status_changed_at: DateTime<Utc>,
    last_validated_at: Option<DateTime<Utc>>,
    last_successful_call_at: Option<DateTime<Utc>>,
    consecutive_failures: u32,
    health_score: f64,
    error_history: VecDeque<ErrorRecord>,
    epoch: u64,
}

impl Session {
    /// Create a session from a successful `connect` or OAuth completion.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidTransition` if `trigger` cannot create a
    /// session in `status` from `previous`.
    #[allow(clippy::too_many_arguments)]
    pub fn establish(
        key: SessionKey,
        previous: Option<AccountStatus>,
        trigger: SessionTrigger,
        status: AccountStatus,
        authentication_step: AuthenticationStep,
        token_info: Option<TokenInfo>,
        account_info: Option<AccountInfo>,
        now: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        SessionStateMachine::validate_transition(previous, trigger, status)?;
        Ok(Self {
            key,
            status,
            authentication_step,
            token_info,
            account_info,
            connected_at: now,
            status_changed_at: now,
            last_validated_at: None,
            last_successful_call_at: None,
            consecutive_failures: 0,
            health_score: MAX_HEALTH_SCORE,
            error_history: VecDeque::new(),
            epoch: 0,
        })
    }

    /// Set the store generation this session belongs to.
    #[must_use]
    pub const fn with_epoch(mut self, epoch: u64) -> Self {
        self.epoch = epoch;
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Session identity.
    #[must_use]
    pub const fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> AccountStatus {
        self.status
    }

    /// Next step the caller must take.
    #[must_use]
    pub const fn authentication_step(&self) -> AuthenticationStep {
        self.authentication_step
    }

    /// Token material, if any.
    #[must_use]
    pub const fn token_info(&self) -> Option<&TokenInfo> {
        self.token_info.as_ref()
    }

    /// Account profile, if known.
    #[must_use]
    pub const fn account_info(&self) -> Option<&AccountInfo> {
        self.account_info.as_ref()
    }

    /// When the session was established.
    #[must_use]
    pub const fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// When the status last changed.
    #[must_use]
    pub const fn status_changed_at(&self) -> DateTime<Utc> {
        self.status_changed_at
    }

    /// Last validation attempt that succeeded.
    #[must_use]
    pub const fn last_validated_at(&self) -> Option<DateTime<Utc>> {
        self.last_validated_at
    }

    /// Last successful real trading call.
    #[must_use]
    pub const fn last_successful_call_at(&self) -> Option<DateTime<Utc>> {
        self.last_successful_call_at
    }

    /// Current failure streak.
    #[must_use]
    pub const fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Health score in `[0, 100]`.
    #[must_use]
    pub const fn health_score(&self) -> f64 {
        self.health_score
    }

    /// Recent failures, most recent first.
    #[must_use]
    pub const fn error_history(&self) -> &VecDeque<ErrorRecord> {
        &self.error_history
    }

    /// Most recent failure.
    #[must_use]
    pub fn last_error(&self) -> Option<&ErrorRecord> {
        self.error_history.front()
    }

    /// Store generation used for check-then-write.
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    // =========================================================================
    // State transitions
    // =========================================================================

    /// Apply a status change driven by `trigger`.
    ///
    /// Returns the previous status.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidTransition` and leaves the session
    /// untouched if the state machine rejects the change.
    pub fn transition(
        &mut self,
        trigger: SessionTrigger,
        to: AccountStatus,
        step: AuthenticationStep,
        now: DateTime<Utc>,
    ) -> Result<AccountStatus, SessionError> {
        SessionStateMachine::validate_transition(Some(self.status), trigger, to)?;
        let previous = self.status;
        if previous != to {
            self.status_changed_at = now;
        }
        self.status = to;
        self.authentication_step = step;
        Ok(previous)
    }

    /// Replace the token atomically, e.g. after a refresh.
    pub fn replace_token(&mut self, token_info: TokenInfo) {
        self.token_info = Some(token_info);
    }

    /// Drop the refresh path after a permanent refresh failure.
    pub fn revoke_refresh(&mut self) {
        if let Some(token) = self.token_info.as_mut() {
            token.revoke_refresh();
        }
    }

    // =========================================================================
    // Health bookkeeping
    // =========================================================================

    /// Record a successful validation.
    pub fn record_success(&mut self, policy: &HealthPolicy, now: DateTime<Utc>) -> HealthChange {
        let previous_score = self.health_score;
        self.consecutive_failures = 0;
        self.health_score = policy.score_after_success(self.health_score);
        self.last_validated_at = Some(now);
        HealthChange {
            previous_score,
            score: self.health_score,
            consecutive_failures: 0,
        }
    }

    /// Record a successful trading call made with this session.
    pub fn record_call_success(&mut self, now: DateTime<Utc>) {
        self.last_successful_call_at = Some(now);
    }

    /// Record a failed validation or refresh.
    pub fn record_failure(
        &mut self,
        policy: &HealthPolicy,
        kind: ErrorKind,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> HealthChange {
        let previous_score = self.health_score;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.health_score =
            policy.score_after_failure(self.health_score, self.consecutive_failures);

        self.error_history.push_front(ErrorRecord {
            at: now,
            kind,
            message: message.into(),
        });
        self.error_history.truncate(policy.error_history_limit);

        HealthChange {
            previous_score,
            score: self.health_score,
            consecutive_failures: self.consecutive_failures,
        }
    }

    /// True if the session has been INACTIVE for longer than `retention`.
    #[must_use]
    pub fn is_expired_inactive(&self, retention: Duration, now: DateTime<Utc>) -> bool {
        self.status == AccountStatus::Inactive && now - self.status_changed_at > retention
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active_session() -> Session {
        Session::establish(
            SessionKey::new("42", "direct", "A1"),
            None,
            SessionTrigger::Connected,
            AccountStatus::Active,
            AuthenticationStep::DirectAuth,
            Some(TokenInfo::non_expiring("tok")),
            Some(AccountInfo::new("A1", "Jane", "Direct")),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn establish_starts_fully_healthy() {
        let session = active_session();
        assert_eq!(session.health_score(), 100.0);
        assert_eq!(session.consecutive_failures(), 0);
        assert!(session.error_history().is_empty());
        assert_eq!(session.epoch(), 0);
    }

    #[test]
    fn establish_rejects_illegal_status() {
        let result = Session::establish(
            SessionKey::new("42", "direct", "A1"),
            None,
            SessionTrigger::Connected,
            AccountStatus::Inactive,
            AuthenticationStep::ReauthRequired,
            None,
            None,
            Utc::now(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn three_network_failures_keep_status_and_score_above_zero() {
        let policy = HealthPolicy::default();
        let mut session = active_session();
        let now = Utc::now();
        for _ in 0..3 {
            session.record_failure(&policy, ErrorKind::NetworkError, "timeout", now);
        }
        assert_eq!(session.status(), AccountStatus::Active);
        assert_eq!(session.consecutive_failures(), 3);
        assert!(session.health_score() > 0.0);
        assert!(session.health_score() < 100.0);
    }

    #[test]
    fn success_after_failures_raises_score_and_resets_streak() {
        let policy = HealthPolicy::default();
        let mut session = active_session();
        let now = Utc::now();
        session.record_failure(&policy, ErrorKind::NetworkError, "timeout", now);
        let low = session.health_score();
        let change = session.record_success(&policy, now);
        assert!(change.score > low);
        assert_eq!(session.consecutive_failures(), 0);
        assert_eq!(session.last_validated_at(), Some(now));
    }

    #[test]
    fn error_history_is_capped_most_recent_first() {
        let policy = HealthPolicy {
            error_history_limit: 2,
            ..HealthPolicy::default()
        };
        let mut session = active_session();
        let now = Utc::now();
        session.record_failure(&policy, ErrorKind::NetworkError, "first", now);
        session.record_failure(&policy, ErrorKind::ServerError, "second", now);
        session.record_failure(&policy, ErrorKind::RateLimited, "third", now);
        assert_eq!(session.error_history().len(), 2);
        assert_eq!(session.last_error().unwrap().message, "third");
        assert_eq!(session.error_history()[1].message, "second");
    }

    #[test]
    fn health_change_detects_threshold_crossing() {
        let policy = HealthPolicy::default();
        let mut session = active_session();
        let now = Utc::now();
        let first = session.record_failure(&policy, ErrorKind::NetworkError, "a", now);
        let second = session.record_failure(&policy, ErrorKind::NetworkError, "b", now);
        let third = session.record_failure(&policy, ErrorKind::NetworkError, "c", now);
        assert!(!first.crossed_below(50.0));
        assert!(!second.crossed_below(50.0));
        assert!(third.crossed_below(50.0));
    }

    #[test]
    fn transition_rejects_illegal_change_without_mutating() {
        let mut session = active_session();
        session
            .transition(
                SessionTrigger::Disconnected,
                AccountStatus::Inactive,
                AuthenticationStep::ReauthRequired,
                Utc::now(),
            )
            .unwrap();
        let before = session.clone();
        let result = session.transition(
            SessionTrigger::ProbeSucceeded,
            AccountStatus::Active,
            AuthenticationStep::DirectAuth,
            Utc::now(),
        );
        assert!(result.is_err());
        assert_eq!(session, before);
    }

    #[test]
    fn inactive_retention() {
        let mut session = active_session();
        let changed = Utc::now();
        session
            .transition(
                SessionTrigger::Disconnected,
                AccountStatus::Inactive,
                AuthenticationStep::ReauthRequired,
                changed,
            )
            .unwrap();
        assert!(!session.is_expired_inactive(Duration::hours(1), changed + Duration::minutes(30)));
        assert!(session.is_expired_inactive(Duration::hours(1), changed + Duration::hours(2)));
    }
}
