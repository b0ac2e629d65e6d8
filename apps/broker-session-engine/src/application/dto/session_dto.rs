//! Session DTOs

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::session::{
    AccountInfo, AccountStatus, AuthenticationStep, ErrorKind, ErrorRecord, HealthBucket,
    HealthPolicy, Session, SessionKey, TokenInfo,
};

/// Health view of one session, as returned by `getSessionHealth`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHealthDto {
    /// User id.
    pub user_id: String,
    /// Broker name.
    pub broker: String,
    /// Account id.
    pub account_id: String,
    /// Current status.
    pub status: AccountStatus,
    /// Next step the caller must take.
    pub authentication_step: AuthenticationStep,
    /// Health score in `[0, 100]`.
    pub health_score: f64,
    /// Bucket of the health score.
    pub health_bucket: HealthBucket,
    /// Failure streak.
    pub consecutive_failures: u32,
    /// Account display name, if known.
    pub display_name: Option<String>,
    /// Broker display name, if known.
    pub broker_display_name: Option<String>,
    /// Token expiry, `None` for non-expiring tokens.
    pub token_expires_at: Option<DateTime<Utc>>,
    /// Whether the token can be refreshed.
    pub can_refresh: bool,
    /// When the session was established.
    pub connected_at: DateTime<Utc>,
    /// When the status last changed.
    pub status_changed_at: DateTime<Utc>,
    /// Last successful validation.
    pub last_validated_at: Option<DateTime<Utc>>,
    /// Last successful trading call.
    pub last_successful_call_at: Option<DateTime<Utc>>,
    /// Recent failures, most recent first.
    pub error_history: Vec<ErrorRecord>,
}

impl SessionHealthDto {
    /// Create from a domain session.
    #[must_use]
    pub fn from_session(session: &Session, policy: &HealthPolicy) -> Self {
        let key = session.key();
        let token = session.token_info();
        let account = session.account_info();
        Self {
            user_id: key.user_id.to_string(),
            broker: key.broker.to_string(),
            account_id: key.account_id.to_string(),
            status: session.status(),
            authentication_step: session.authentication_step(),
            health_score: session.health_score(),
            health_bucket: policy.bucket(session.health_score()),
            consecutive_failures: session.consecutive_failures(),
            display_name: account.map(|a| a.display_name.clone()),
            broker_display_name: account.map(|a| a.broker_display_name.clone()),
            token_expires_at: token.and_then(TokenInfo::expires_at),
            can_refresh: token.is_some_and(TokenInfo::refreshable),
            connected_at: session.connected_at(),
            status_changed_at: session.status_changed_at(),
            last_validated_at: session.last_validated_at(),
            last_successful_call_at: session.last_successful_call_at(),
            error_history: session.error_history().iter().cloned().collect(),
        }
    }
}

/// Result of an on-demand validation (`validateSession`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    /// Session is usable for trading.
    pub is_valid: bool,
    /// Health score after the validation.
    pub health_score: f64,
    /// A token refresh is needed to recover.
    pub needs_refresh: bool,
    /// Failure message, if the validation failed.
    pub error_message: Option<String>,
    /// Classified failure, if any.
    pub error_kind: Option<ErrorKind>,
    /// Status after the validation.
    pub status: AccountStatus,
    /// Wall time spent, including any in-cycle refresh.
    #[serde(rename = "responseTime", with = "duration_millis")]
    pub response_time: Duration,
}

/// Snapshot used to rehydrate a session after a restart.
///
/// Produced by whoever persists `SessionChange` events; credentials travel
/// separately and are never part of the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Session identity.
    pub key: SessionKey,
    /// Last known status.
    pub status: AccountStatus,
    /// Last known step.
    pub authentication_step: AuthenticationStep,
    /// Token material.
    pub token_info: Option<TokenInfo>,
    /// Account profile.
    pub account_info: Option<AccountInfo>,
}

impl SessionSnapshot {
    /// Snapshot of a live session.
    #[must_use]
    pub fn from_session(session: &Session) -> Self {
        Self {
            key: session.key().clone(),
            status: session.status(),
            authentication_step: session.authentication_step(),
            token_info: session.token_info().cloned(),
            account_info: session.account_info().cloned(),
        }
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::SessionTrigger;

    fn session() -> Session {
        Session::establish(
            SessionKey::new("42", "oauth", "XY1234"),
            Some(AccountStatus::ProceedToOauth),
            SessionTrigger::OauthCompleted,
            AccountStatus::Active,
            AuthenticationStep::OauthCompletion,
            Some(TokenInfo::expiring(
                "acc",
                Some("ref".into()),
                Utc::now() + chrono::Duration::hours(1),
            )),
            Some(AccountInfo::new("XY1234", "Jane", "OAuth Broker")),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn health_dto_flattens_session() {
        let dto = SessionHealthDto::from_session(&session(), &HealthPolicy::default());
        assert_eq!(dto.user_id, "42");
        assert_eq!(dto.broker, "oauth");
        assert_eq!(dto.health_bucket, HealthBucket::Healthy);
        assert!(dto.can_refresh);
        assert!(dto.token_expires_at.is_some());
        assert_eq!(dto.display_name.as_deref(), Some("Jane"));

        let json = serde_json::to_value(&dto).unwrap();
        assert_eq!(json["status"], "ACTIVE");
        assert_eq!(json["healthBucket"], "healthy");
    }

    #[test]
    fn validation_report_reports_response_time_in_millis() {
        let report = ValidationReport {
            is_valid: true,
            health_score: 100.0,
            needs_refresh: false,
            error_message: None,
            error_kind: None,
            status: AccountStatus::Active,
            response_time: Duration::from_millis(250),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["isValid"], true);
        assert_eq!(json["responseTime"], 250);
    }

    #[test]
    fn snapshot_never_carries_token_values_in_debug() {
        let snapshot = SessionSnapshot::from_session(&session());
        let rendered = format!("{snapshot:?}");
        assert!(!rendered.contains("acc\""));
        assert!(rendered.contains("REDACTED"));
    }
}
