//! Alert Sink Port (Driven Port)
//!
//! Fire-and-forget delivery of session alerts. Implementations must not block
//! the caller; delivery failures are logged and dropped.

use tokio::sync::mpsc;

use crate::domain::session::SessionAlert;

/// Port for emitting session alerts.
pub trait AlertSinkPort: Send + Sync {
    /// Emit an alert without waiting for delivery.
    fn publish(&self, alert: SessionAlert);
}

/// Sink that discards every alert.
#[derive(Debug, Clone, Default)]
pub struct NoOpAlertSink;

impl AlertSinkPort for NoOpAlertSink {
    fn publish(&self, _alert: SessionAlert) {}
}

/// Sink that writes alerts to the tracing pipeline.
#[derive(Debug, Clone, Default)]
pub struct TracingAlertSink;

impl AlertSinkPort for TracingAlertSink {
    fn publish(&self, alert: SessionAlert) {
        tracing::warn!(
            alert_id = %alert.id,
            session = %alert.session_key,
            previous_status = %alert.previous_status,
            new_status = %alert.new_status,
            error_kind = ?alert.error_kind,
            reason = ?alert.reason,
            health_score = alert.health_score,
            consecutive_failures = alert.consecutive_failures,
            message = %alert.message,
            "Session alert"
        );
    }
}

/// Sink backed by a bounded channel. Alerts are dropped when the consumer
/// falls behind.
#[derive(Debug, Clone)]
pub struct ChannelAlertSink {
    tx: mpsc::Sender<SessionAlert>,
}

impl ChannelAlertSink {
    /// Create a sink and the receiving half.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<SessionAlert>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl AlertSinkPort for ChannelAlertSink {
    fn publish(&self, alert: SessionAlert) {
        if let Err(e) = self.tx.try_send(alert) {
            tracing::warn!(error = %e, "Dropping session alert, sink unavailable");
        }
    }
}
