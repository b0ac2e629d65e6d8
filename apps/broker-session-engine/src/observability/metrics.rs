//! Prometheus metrics for the session engine.
//!
//! # Metrics Categories
//!
//! - **Operations**: broker calls by operation and outcome, with latency
//! - **Sessions**: session counts by status, status transitions
//! - **Supervisor**: cycle duration, alerts, stale results dropped
//! - **Rate limiting**: calls rejected before reaching a broker
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::session::{AccountStatus, AlertReason};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Error type for metrics operations.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Failed to install the Prometheus recorder.
    #[error("metrics installation error: {0}")]
    Installation(String),
}

/// Install the Prometheus recorder. Later calls return the same handle.
///
/// # Errors
///
/// Returns `MetricsError::Installation` if another recorder is installed.
pub fn init_metrics() -> Result<PrometheusHandle, MetricsError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| MetricsError::Installation(e.to_string()))?;
    register_metrics();

    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "broker_session_operations_total",
        "Broker operations by broker, operation and outcome"
    );
    describe_histogram!(
        "broker_session_operation_seconds",
        "Broker operation latency including timeouts"
    );
    describe_counter!(
        "broker_session_transitions_total",
        "Session status transitions"
    );
    describe_gauge!("broker_session_sessions", "Sessions in the store by status");
    describe_counter!(
        "broker_session_alerts_total",
        "Alerts emitted by the health supervisor"
    );
    describe_counter!(
        "broker_session_rate_limited_total",
        "Operations rejected by the local rate limiter"
    );
    describe_counter!(
        "broker_session_stale_results_total",
        "In-flight results dropped because the session changed underneath"
    );
    describe_histogram!(
        "broker_session_supervisor_cycle_seconds",
        "Duration of one supervisor sweep"
    );
    describe_counter!(
        "broker_session_purged_total",
        "Inactive sessions purged after the retention window"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record one broker operation.
///
/// # Arguments
///
/// * `broker` - Broker plugin name
/// * `operation` - Operation label (e.g. "validate", "refresh")
/// * `success` - Whether the broker accepted the call
/// * `duration` - Wall time including timeout handling
pub fn record_operation(broker: &str, operation: &str, success: bool, duration: Duration) {
    counter!(
        "broker_session_operations_total",
        "broker" => broker.to_string(),
        "operation" => operation.to_string(),
        "outcome" => if success { "success" } else { "failure" }
    )
    .increment(1);

    histogram!(
        "broker_session_operation_seconds",
        "broker" => broker.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a status transition.
pub fn record_transition(broker: &str, from: AccountStatus, to: AccountStatus) {
    counter!(
        "broker_session_transitions_total",
        "broker" => broker.to_string(),
        "from" => from.as_str(),
        "to" => to.as_str()
    )
    .increment(1);
}

/// Set the number of sessions with a status.
pub fn set_sessions(status: AccountStatus, count: usize) {
    gauge!("broker_session_sessions", "status" => status.as_str()).set(count as f64);
}

/// Record an emitted alert.
pub fn record_alert(reason: AlertReason) {
    let reason = match reason {
        AlertReason::HealthDegraded => "health_degraded",
        AlertReason::ConsecutiveFailures => "consecutive_failures",
        AlertReason::StatusDemoted => "status_demoted",
    };
    counter!("broker_session_alerts_total", "reason" => reason).increment(1);
}

/// Record a call rejected by the local rate limiter.
pub fn record_rate_limited(broker: &str, operation: &str) {
    counter!(
        "broker_session_rate_limited_total",
        "broker" => broker.to_string(),
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record a result dropped by check-then-write.
pub fn record_stale_result(broker: &str) {
    counter!(
        "broker_session_stale_results_total",
        "broker" => broker.to_string()
    )
    .increment(1);
}

/// Record one supervisor sweep.
pub fn record_supervisor_cycle(duration: Duration, purged: usize) {
    histogram!("broker_session_supervisor_cycle_seconds").record(duration.as_secs_f64());
    if purged > 0 {
        counter!("broker_session_purged_total").increment(purged as u64);
    }
}
