//! Sliding-window rate limiter keyed by `(broker, operation)`.
//!
//! Each key keeps the instants of recent calls in a window. A call is
//! admitted while fewer than `max_calls` fall inside the window; otherwise it
//! is rejected with the time until the oldest call ages out.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broker operations subject to rate limiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerOperation {
    /// `connect`.
    Connect,
    /// `completeOAuth`.
    CompleteOauth,
    /// `refreshToken`.
    Refresh,
    /// `validateSession`.
    Validate,
    /// `disconnect`.
    Disconnect,
}

impl BrokerOperation {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::CompleteOauth => "complete_oauth",
            Self::Refresh => "refresh",
            Self::Validate => "validate",
            Self::Disconnect => "disconnect",
        }
    }
}

impl fmt::Display for BrokerOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Limit for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    /// Calls admitted per window.
    pub max_calls: u32,
    /// Window length.
    #[serde(with = "duration_secs")]
    pub window: Duration,
}

impl RateLimit {
    /// Create a limit.
    #[must_use]
    pub const fn new(max_calls: u32, window: Duration) -> Self {
        Self { max_calls, window }
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self::new(10, Duration::from_secs(1))
    }
}

/// Rejection returned when a key is over its limit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Rate limit exceeded for {broker}/{operation}, retry in {retry_after:?}")]
pub struct RateLimitExceeded {
    /// Broker name.
    pub broker: String,
    /// Operation.
    pub operation: BrokerOperation,
    /// Suggested wait.
    pub retry_after: Duration,
}

/// Limits by scope. Lookup order: broker+operation, operation, default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimiterConfig {
    /// Fallback limit.
    pub default: RateLimit,
    /// Limits per operation for every broker.
    pub per_operation: HashMap<BrokerOperation, RateLimit>,
    /// Limits for one broker's operation.
    pub per_broker: HashMap<(String, BrokerOperation), RateLimit>,
}

impl RateLimiterConfig {
    /// Limit that applies to a key.
    #[must_use]
    pub fn limit_for(&self, broker: &str, operation: BrokerOperation) -> RateLimit {
        self.per_broker
            .get(&(broker.to_string(), operation))
            .or_else(|| self.per_operation.get(&operation))
            .copied()
            .unwrap_or(self.default)
    }
}

/// Sliding-window rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    windows: Mutex<HashMap<(String, BrokerOperation), VecDeque<Instant>>>,
}

impl RateLimiter {
    /// Create a limiter.
    #[must_use]
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Admit a call now.
    ///
    /// # Errors
    ///
    /// Returns `RateLimitExceeded` if the key is over its limit.
    pub fn try_acquire(
        &self,
        broker: &str,
        operation: BrokerOperation,
    ) -> Result<(), RateLimitExceeded> {
        self.try_acquire_at(broker, operation, Instant::now())
    }

    /// Admit a call at `now`.
    ///
    /// # Errors
    ///
    /// Returns `RateLimitExceeded` if the key is over its limit.
    pub fn try_acquire_at(
        &self,
        broker: &str,
        operation: BrokerOperation,
        now: Instant,
    ) -> Result<(), RateLimitExceeded> {
        let limit = self.config.limit_for(broker, operation);
        if limit.max_calls == 0 {
            return Err(RateLimitExceeded {
                broker: broker.to_string(),
                operation,
                retry_after: limit.window,
            });
        }

        let mut windows = self.windows.lock();
        let window = windows
            .entry((broker.to_string(), operation))
            .or_default();

        while let Some(&oldest) = window.front() {
            if now.saturating_duration_since(oldest) >= limit.window {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() >= limit.max_calls as usize {
            let retry_after = window.front().map_or(limit.window, |&oldest| {
                limit
                    .window
                    .saturating_sub(now.saturating_duration_since(oldest))
            });
            return Err(RateLimitExceeded {
                broker: broker.to_string(),
                operation,
                retry_after,
            });
        }

        window.push_back(now);
        Ok(())
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom("window must be a non-negative number"));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_calls: u32, window: Duration) -> RateLimiter {
        RateLimiter::new(RateLimiterConfig {
            default: RateLimit::new(max_calls, window),
            ..RateLimiterConfig::default()
        })
    }

    #[test]
    fn admits_up_to_limit_then_rejects() {
        let limiter = limiter(2, Duration::from_secs(1));
        let now = Instant::now();
        assert!(limiter.try_acquire_at("direct", BrokerOperation::Validate, now).is_ok());
        assert!(limiter.try_acquire_at("direct", BrokerOperation::Validate, now).is_ok());
        let err = limiter
            .try_acquire_at("direct", BrokerOperation::Validate, now)
            .unwrap_err();
        assert_eq!(err.retry_after, Duration::from_secs(1));
        assert_eq!(err.operation, BrokerOperation::Validate);
    }

    #[test]
    fn window_slides() {
        let limiter = limiter(1, Duration::from_secs(1));
        let start = Instant::now();
        assert!(limiter.try_acquire_at("direct", BrokerOperation::Refresh, start).is_ok());
        let err = limiter
            .try_acquire_at("direct", BrokerOperation::Refresh, start + Duration::from_millis(400))
            .unwrap_err();
        assert_eq!(err.retry_after, Duration::from_millis(600));
        assert!(
            limiter
                .try_acquire_at("direct", BrokerOperation::Refresh, start + Duration::from_secs(1))
                .is_ok()
        );
    }

    #[test]
    fn keys_are_independent() {
        let limiter = limiter(1, Duration::from_secs(60));
        let now = Instant::now();
        assert!(limiter.try_acquire_at("direct", BrokerOperation::Validate, now).is_ok());
        assert!(limiter.try_acquire_at("oauth", BrokerOperation::Validate, now).is_ok());
        assert!(limiter.try_acquire_at("direct", BrokerOperation::Refresh, now).is_ok());
        assert!(limiter.try_acquire_at("direct", BrokerOperation::Validate, now).is_err());
    }

    #[test]
    fn broker_override_wins_over_operation_limit() {
        let mut config = RateLimiterConfig::default();
        config
            .per_operation
            .insert(BrokerOperation::Connect, RateLimit::new(5, Duration::from_secs(1)));
        config.per_broker.insert(
            ("oauth".to_string(), BrokerOperation::Connect),
            RateLimit::new(1, Duration::from_secs(1)),
        );
        assert_eq!(config.limit_for("oauth", BrokerOperation::Connect).max_calls, 1);
        assert_eq!(config.limit_for("direct", BrokerOperation::Connect).max_calls, 5);
        assert_eq!(config.limit_for("direct", BrokerOperation::Validate).max_calls, 10);
    }

    #[test]
    fn zero_limit_rejects_everything() {
        let limiter = limiter(0, Duration::from_secs(5));
        assert!(limiter.try_acquire("direct", BrokerOperation::Connect).is_err());
    }
}
