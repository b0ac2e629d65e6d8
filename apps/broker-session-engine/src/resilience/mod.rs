//! Resilience patterns for broker calls.
//!
//! - Single-flight: one in-flight validate/refresh per session
//! - Rate limiting: sliding window per `(broker, operation)`

pub mod rate_limiter;
pub mod single_flight;

pub use rate_limiter::{
    BrokerOperation, RateLimit, RateLimitExceeded, RateLimiter, RateLimiterConfig,
};
pub use single_flight::{FlightResult, SingleFlight};
