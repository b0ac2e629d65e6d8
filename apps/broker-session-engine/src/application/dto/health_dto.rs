//! Aggregate health DTOs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::session::{AccountStatus, HealthBucket, HealthPolicy, Session};

/// Store-wide health statistics (`getHealthStatistics`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatistics {
    /// Sessions in the store.
    pub total_sessions: usize,
    /// Session count per status. Every status is present.
    pub by_status: BTreeMap<AccountStatus, usize>,
    /// Sessions scoring healthy.
    pub healthy: usize,
    /// Sessions scoring degraded.
    pub degraded: usize,
    /// Sessions scoring critical.
    pub critical: usize,
    /// Mean health score, 100 when the store is empty.
    pub average_health_score: f64,
    /// Overall bucket.
    pub overall: HealthBucket,
    /// When the statistics were computed.
    pub generated_at: DateTime<Utc>,
}

impl HealthStatistics {
    /// Compute statistics over a snapshot of sessions.
    ///
    /// The overall bucket is the bucket of the mean score, except that any
    /// supervised session in the critical bucket makes the whole store at
    /// least degraded.
    #[must_use]
    pub fn from_sessions(sessions: &[Session], policy: &HealthPolicy) -> Self {
        let mut by_status: BTreeMap<AccountStatus, usize> =
            AccountStatus::ALL.into_iter().map(|s| (s, 0)).collect();
        let (mut healthy, mut degraded, mut critical) = (0, 0, 0);
        let mut critical_supervised = false;
        let mut score_sum = 0.0;

        for session in sessions {
            *by_status.entry(session.status()).or_default() += 1;
            score_sum += session.health_score();
            match policy.bucket(session.health_score()) {
                HealthBucket::Healthy => healthy += 1,
                HealthBucket::Degraded => degraded += 1,
                HealthBucket::Critical => {
                    critical += 1;
                    critical_supervised |= session.status().is_supervised();
                }
            }
        }

        let average_health_score = if sessions.is_empty() {
            100.0
        } else {
            score_sum / sessions.len() as f64
        };
        let mut overall = policy.bucket(average_health_score);
        if critical_supervised && overall == HealthBucket::Healthy {
            overall = HealthBucket::Degraded;
        }

        Self {
            total_sessions: sessions.len(),
            by_status,
            healthy,
            degraded,
            critical,
            average_health_score,
            overall,
            generated_at: Utc::now(),
        }
    }

    /// Sessions with the given status.
    #[must_use]
    pub fn count(&self, status: AccountStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::{
        AuthenticationStep, ErrorKind, SessionKey, SessionTrigger, TokenInfo,
    };

    fn active(account: &str) -> Session {
        Session::establish(
            SessionKey::new("42", "direct", account),
            None,
            SessionTrigger::Connected,
            AccountStatus::Active,
            AuthenticationStep::DirectAuth,
            Some(TokenInfo::non_expiring("tok")),
            None,
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn empty_store_is_healthy() {
        let stats = HealthStatistics::from_sessions(&[], &HealthPolicy::default());
        assert_eq!(stats.total_sessions, 0);
        assert_eq!(stats.overall, HealthBucket::Healthy);
        assert_eq!(stats.by_status.len(), AccountStatus::ALL.len());
        assert_eq!(stats.count(AccountStatus::Active), 0);
    }

    #[test]
    fn counts_statuses_and_buckets() {
        let policy = HealthPolicy::default();
        let mut failing = active("A2");
        for _ in 0..3 {
            failing.record_failure(&policy, ErrorKind::NetworkError, "timeout", Utc::now());
        }
        let sessions = vec![active("A1"), failing, active("A3")];

        let stats = HealthStatistics::from_sessions(&sessions, &policy);
        assert_eq!(stats.total_sessions, 3);
        assert_eq!(stats.count(AccountStatus::Active), 3);
        assert_eq!((stats.healthy, stats.degraded, stats.critical), (2, 0, 1));
        assert_eq!(stats.average_health_score, 80.0);
        assert_eq!(stats.overall, HealthBucket::Degraded);
    }

    #[test]
    fn status_keys_serialize_as_wire_names() {
        let stats = HealthStatistics::from_sessions(&[active("A1")], &HealthPolicy::default());
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["byStatus"]["ACTIVE"], 1);
        assert_eq!(json["byStatus"]["PROCEED_TO_OAUTH"], 0);
        assert_eq!(json["overall"], "healthy");
    }
}
