//! Observability module for metrics.
//!
//! Recording functions are callable from every layer; the recorder is
//! installed once by the binary and rendered by the health server.

mod metrics;

pub use metrics::{
    MetricsError, get_metrics_handle, init_metrics, record_alert, record_operation,
    record_rate_limited, record_stale_result, record_supervisor_cycle, record_transition,
    set_sessions,
};
