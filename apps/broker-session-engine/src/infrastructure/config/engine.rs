//! Session engine tuning: timeouts, supervision, health scoring, rate limits.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::session::HealthPolicy;
use crate::resilience::{BrokerOperation, RateLimit, RateLimiterConfig};

/// Per-operation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Upper bound on one broker call, in seconds.
    pub operation_timeout_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            operation_timeout_secs: 30,
        }
    }
}

impl SessionSettings {
    /// Operation timeout.
    #[must_use]
    pub const fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}

/// Health supervisor settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorSettings {
    /// Seconds between sweeps.
    pub tick_interval_secs: u64,
    /// Validations allowed to run at once.
    pub max_concurrent_validations: usize,
    /// Seconds an INACTIVE session is kept before purge.
    pub inactive_retention_secs: u64,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            tick_interval_secs: 30,
            max_concurrent_validations: 8,
            inactive_retention_secs: 3600,
        }
    }
}

/// Health scoring settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
    /// Score gained per successful validation.
    pub success_increment: f64,
    /// Base penalty, multiplied by the failure streak.
    pub failure_penalty: f64,
    /// Alert when the score crosses below this.
    pub warning_threshold: f64,
    /// Alert when the failure streak reaches this.
    pub critical_failures: u32,
    /// Errors kept per session.
    pub error_history_limit: usize,
}

impl Default for HealthSettings {
    fn default() -> Self {
        let policy = HealthPolicy::default();
        Self {
            success_increment: policy.success_increment,
            failure_penalty: policy.failure_penalty,
            warning_threshold: policy.warning_threshold,
            critical_failures: policy.critical_failures,
            error_history_limit: policy.error_history_limit,
        }
    }
}

impl HealthSettings {
    /// Domain policy for these settings.
    #[must_use]
    pub const fn to_policy(&self) -> HealthPolicy {
        HealthPolicy {
            success_increment: self.success_increment,
            failure_penalty: self.failure_penalty,
            warning_threshold: self.warning_threshold,
            critical_failures: self.critical_failures,
            error_history_limit: self.error_history_limit,
        }
    }
}

/// Rate limit settings.
///
/// ```yaml
/// rate_limits:
///   default: { max_calls: 10, window: 1 }
///   operations:
///     validate: { max_calls: 5, window: 1 }
///   brokers:
///     oauth:
///       refresh: { max_calls: 1, window: 10 }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Fallback limit.
    pub default: RateLimit,
    /// Limits per operation for every broker.
    pub operations: HashMap<BrokerOperation, RateLimit>,
    /// Limits per broker, then operation.
    pub brokers: HashMap<String, HashMap<BrokerOperation, RateLimit>>,
}

impl RateLimitSettings {
    /// Limiter configuration.
    #[must_use]
    pub fn to_limiter_config(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            default: self.default,
            per_operation: self.operations.clone(),
            per_broker: self
                .brokers
                .iter()
                .flat_map(|(broker, limits)| {
                    limits
                        .iter()
                        .map(move |(operation, limit)| ((broker.clone(), *operation), *limit))
                })
                .collect(),
        }
    }

    /// Every configured limit with a label for error messages.
    pub(crate) fn labelled(&self) -> Vec<(String, RateLimit)> {
        let mut limits = vec![("default".to_string(), self.default)];
        limits.extend(
            self.operations
                .iter()
                .map(|(op, limit)| (op.as_str().to_string(), *limit)),
        );
        for (broker, ops) in &self.brokers {
            limits.extend(
                ops.iter()
                    .map(|(op, limit)| (format!("{broker}.{}", op.as_str()), *limit)),
            );
        }
        limits
    }
}
