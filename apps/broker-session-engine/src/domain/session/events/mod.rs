//! Domain events for sessions.
//!
//! `SessionAlert` goes to operators through the alert sink. `SessionChange`
//! goes to whoever persists session snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::services::SessionTrigger;
use super::value_objects::{AccountStatus, ErrorKind, SessionKey};

/// Why an alert was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertReason {
    /// Health score crossed below the warning threshold.
    HealthDegraded,
    /// Failure streak reached the critical threshold.
    ConsecutiveFailures,
    /// Status was demoted after an auth failure.
    StatusDemoted,
}

/// Alert emitted by the supervisor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionAlert {
    /// Unique alert id.
    pub id: Uuid,
    /// Session the alert concerns.
    pub session_key: SessionKey,
    /// Status before the cycle that raised the alert.
    pub previous_status: AccountStatus,
    /// Status after the cycle.
    pub new_status: AccountStatus,
    /// Classified error behind the alert.
    pub error_kind: Option<ErrorKind>,
    /// Human-readable message.
    pub message: String,
    /// When the alert was raised.
    pub timestamp: DateTime<Utc>,
    /// Rule that fired.
    pub reason: AlertReason,
    /// Health score after the cycle.
    pub health_score: f64,
    /// Failure streak after the cycle.
    pub consecutive_failures: u32,
}

/// Change published by the session store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionChange {
    /// Session created or replaced (connect, OAuth completion, restore).
    Established {
        /// Session identity.
        key: SessionKey,
        /// Status at creation.
        status: AccountStatus,
        /// Store generation.
        epoch: u64,
        /// When it happened.
        occurred_at: DateTime<Utc>,
    },
    /// Status changed.
    StatusChanged {
        /// Session identity.
        key: SessionKey,
        /// Previous status.
        from: AccountStatus,
        /// New status.
        to: AccountStatus,
        /// What caused it.
        trigger: SessionTrigger,
        /// When it happened.
        occurred_at: DateTime<Utc>,
    },
    /// Session removed from the store.
    Removed {
        /// Session identity.
        key: SessionKey,
        /// When it happened.
        occurred_at: DateTime<Utc>,
    },
}

impl SessionChange {
    /// Session this change concerns.
    #[must_use]
    pub const fn key(&self) -> &SessionKey {
        match self {
            Self::Established { key, .. }
            | Self::StatusChanged { key, .. }
            | Self::Removed { key, .. } => key,
        }
    }

    /// Event type name.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::Established { .. } => "SESSION_ESTABLISHED",
            Self::StatusChanged { .. } => "SESSION_STATUS_CHANGED",
            Self::Removed { .. } => "SESSION_REMOVED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_serializes_camel_case() {
        let alert = SessionAlert {
            id: Uuid::new_v4(),
            session_key: SessionKey::new("42", "direct", "A1"),
            previous_status: AccountStatus::Active,
            new_status: AccountStatus::Active,
            error_kind: Some(ErrorKind::NetworkError),
            message: "timeout".into(),
            timestamp: Utc::now(),
            reason: AlertReason::ConsecutiveFailures,
            health_score: 40.0,
            consecutive_failures: 3,
        };
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["previousStatus"], "ACTIVE");
        assert_eq!(json["errorKind"], "NETWORK_ERROR");
        assert_eq!(json["reason"], "CONSECUTIVE_FAILURES");
    }

    #[test]
    fn change_exposes_key_and_type() {
        let change = SessionChange::Removed {
            key: SessionKey::new("42", "direct", "A1"),
            occurred_at: Utc::now(),
        };
        assert_eq!(change.key().account_id.as_str(), "A1");
        assert_eq!(change.event_type(), "SESSION_REMOVED");
    }
}
