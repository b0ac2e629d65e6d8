//! Health scoring policy and derived buckets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ErrorKind;

/// Upper bound of the health score.
pub const MAX_HEALTH_SCORE: f64 = 100.0;

/// Tunables for health bookkeeping.
///
/// On success the score rises by `success_increment` (capped at 100). On
/// failure it drops by `failure_penalty * consecutive_failures` (floored at
/// 0), so each failure in a streak costs more than the previous one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthPolicy {
    /// Score added after a successful validation.
    pub success_increment: f64,
    /// Base penalty multiplied by the failure streak length.
    pub failure_penalty: f64,
    /// Alert when the score crosses below this value.
    pub warning_threshold: f64,
    /// Alert when the failure streak reaches this length.
    pub critical_failures: u32,
    /// Maximum entries kept in a session's error history.
    pub error_history_limit: usize,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            success_increment: 10.0,
            failure_penalty: 10.0,
            warning_threshold: 50.0,
            critical_failures: 3,
            error_history_limit: 5,
        }
    }
}

impl HealthPolicy {
    /// Score after a success.
    #[must_use]
    pub fn score_after_success(&self, score: f64) -> f64 {
        (score + self.success_increment).min(MAX_HEALTH_SCORE)
    }

    /// Score after a failure, given the streak length including this failure.
    #[must_use]
    pub fn score_after_failure(&self, score: f64, consecutive_failures: u32) -> f64 {
        (self.failure_penalty.mul_add(-f64::from(consecutive_failures), score)).max(0.0)
    }

    /// Bucket for a score.
    #[must_use]
    pub fn bucket(&self, score: f64) -> HealthBucket {
        if score >= 80.0 {
            HealthBucket::Healthy
        } else if score >= self.warning_threshold {
            HealthBucket::Degraded
        } else {
            HealthBucket::Critical
        }
    }
}

/// Coarse health classification used by the read API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthBucket {
    /// Score at or above 80.
    Healthy,
    /// Score between the warning threshold and 80.
    Degraded,
    /// Score below the warning threshold.
    Critical,
}

/// One failed operation in a session's error history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// When the failure was recorded.
    pub at: DateTime<Utc>,
    /// Canonical classification.
    pub kind: ErrorKind,
    /// Broker or local message.
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn success_caps_at_max() {
        let policy = HealthPolicy::default();
        assert_eq!(policy.score_after_success(95.0), 100.0);
        assert_eq!(policy.score_after_success(40.0), 50.0);
    }

    #[test]
    fn failure_penalty_scales_with_streak() {
        let policy = HealthPolicy::default();
        let first = policy.score_after_failure(100.0, 1);
        let second = policy.score_after_failure(first, 2);
        let third = policy.score_after_failure(second, 3);
        assert_eq!((first, second, third), (90.0, 70.0, 40.0));
    }

    #[test]
    fn failure_floors_at_zero() {
        let policy = HealthPolicy::default();
        assert_eq!(policy.score_after_failure(5.0, 4), 0.0);
    }

    #[test]
    fn buckets_follow_thresholds() {
        let policy = HealthPolicy::default();
        assert_eq!(policy.bucket(100.0), HealthBucket::Healthy);
        assert_eq!(policy.bucket(60.0), HealthBucket::Degraded);
        assert_eq!(policy.bucket(49.9), HealthBucket::Critical);
    }

    proptest! {
        #[test]
        fn failures_never_raise_score(score in 0.0f64..=100.0, streak in 1u32..50) {
            let policy = HealthPolicy::default();
            let next = policy.score_after_failure(score, streak);
            prop_assert!(next <= score);
            prop_assert!(next >= 0.0);
        }

        #[test]
        fn success_stays_in_range(score in 0.0f64..=100.0) {
            let policy = HealthPolicy::default();
            let next = policy.score_after_success(score);
            prop_assert!(next >= score);
            prop_assert!(next <= MAX_HEALTH_SCORE);
        }
    }
}
