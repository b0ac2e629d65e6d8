// Allow unwrap/expect in tests - tests should panic on unexpected errors
// Allow test-specific patterns and pedantic lints in test code
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Broker Session Engine - Rust Core Library
//!
//! Keeps brokerage sessions authenticated across brokers with different
//! login protocols, behind one canonical status model.
//!
//! # Architecture (Clean Architecture + DDD + Hexagonal)
//!
//! ## Layers (inside → outside)
//!
//! - **Domain**: Canonical session model
//!   - `session`: Session aggregate, status state machine, error kinds,
//!     health scoring, alerts, repository trait
//!
//! - **Application**: Orchestration
//!   - `ports`: `BrokerAdapter` contract and alert sinks
//!   - `registry`: Broker plugins and adapter factories
//!   - `services`: `SessionManager` and the background `SessionSupervisor`
//!   - `dto`: Read-API views (`ValidationReport`, `HealthStatistics`)
//!
//! - **Infrastructure**: Adapters
//!   - `brokers`: Direct-auth (TOTP) and OAuth adapters, response normalizer
//!   - `persistence`: In-memory session store
//!   - `config`, `health`, `telemetry`: process plumbing
//!
//! - **Resilience**: single-flight and rate limiting for broker calls
//! - **Observability**: Prometheus metrics

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Clean Architecture Layers
// =============================================================================

/// Domain layer - Canonical session model with no external dependencies.
pub mod domain;

/// Application layer - Services, registry and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Cross-Cutting Modules
// =============================================================================

/// Resilience patterns for broker calls.
pub mod resilience;

/// Prometheus metrics.
pub mod observability;

// =============================================================================
// Re-exports
// =============================================================================

pub use application::dto::{HealthStatistics, SessionHealthDto, SessionSnapshot, ValidationReport};
pub use application::ports::{
    AlertSinkPort, AuthFlow, AuthResponse, BrokerAdapter, Credentials, TracingAlertSink,
};
pub use application::registry::{BrokerPlugin, BrokerRegistry};
pub use application::services::{
    SessionManager, SessionManagerConfig, SessionSupervisor, SupervisorConfig,
};
pub use domain::session::{
    AccountStatus, AuthenticationStep, ErrorKind, HealthPolicy, Session, SessionAlert,
    SessionError, SessionKey, TokenInfo,
};
pub use infrastructure::persistence::InMemorySessionStore;
pub use observability::init_metrics;
