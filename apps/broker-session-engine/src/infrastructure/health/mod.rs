//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for engine health, session statistics, and Prometheus
//! metrics. Reads only the session store; no handler calls a broker.
//!
//! # Endpoints
//!
//! - `GET /health` - JSON health status with session statistics
//! - `GET /healthz` - Kubernetes liveness probe (simple OK)
//! - `GET /readyz` - Kubernetes readiness probe (brokers registered)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::dto::HealthStatistics;
use crate::application::services::SessionManager;
use crate::domain::session::HealthBucket;
use crate::observability::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Engine version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Registered broker plugins.
    pub brokers: Vec<String>,
    /// Session statistics.
    pub sessions: HealthStatistics,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Sessions are healthy.
    Healthy,
    /// Some sessions are failing but the engine is serving.
    Degraded,
    /// Session health is critical.
    Unhealthy,
}

impl From<HealthBucket> for HealthStatus {
    fn from(bucket: HealthBucket) -> Self {
        match bucket {
            HealthBucket::Healthy => Self::Healthy,
            HealthBucket::Degraded => Self::Degraded,
            HealthBucket::Critical => Self::Unhealthy,
        }
    }
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    manager: Arc<SessionManager>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(version: String, manager: Arc<SessionManager>) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            manager,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    addr: SocketAddr,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(
        addr: SocketAddr,
        state: Arc<HealthServerState>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            addr,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = Router::new()
            .route("/health", get(health_handler))
            .route("/healthz", get(liveness_handler))
            .route("/readyz", get(readiness_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(self.state);

        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.addr, e.to_string()))?;

        tracing::info!(addr = %self.addr, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.manager.registry().list_available().is_empty() {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    } else {
        (StatusCode::OK, "READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let sessions = state.manager.health_statistics();
    HealthResponse {
        status: sessions.overall.into(),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        brokers: state.manager.registry().list_available().into_iter().collect(),
        sessions,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to address.
    #[error("failed to bind to {0}: {1}")]
    BindFailed(SocketAddr, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::NoOpAlertSink;
    use crate::application::registry::BrokerRegistry;
    use crate::application::services::SessionManagerConfig;
    use crate::infrastructure::brokers::{http_plugins, direct::DirectAuthConfig, oauth::OAuthConfig};
    use crate::infrastructure::persistence::InMemorySessionStore;

    fn state(with_brokers: bool) -> Arc<HealthServerState> {
        let registry = BrokerRegistry::new();
        if with_brokers {
            for plugin in http_plugins(DirectAuthConfig::default(), OAuthConfig::default()).unwrap()
            {
                registry.register_plugin(plugin).unwrap();
            }
        }
        let manager = SessionManager::new(
            Arc::new(registry),
            Arc::new(InMemorySessionStore::new()),
            Arc::new(NoOpAlertSink),
            SessionManagerConfig::default(),
        );
        Arc::new(HealthServerState::new("test".to_string(), Arc::new(manager)))
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test]
    fn critical_bucket_is_unhealthy() {
        assert_eq!(HealthStatus::from(HealthBucket::Critical), HealthStatus::Unhealthy);
        assert_eq!(HealthStatus::from(HealthBucket::Degraded), HealthStatus::Degraded);
    }

    #[test]
    fn empty_store_reports_healthy() {
        let response = build_health_response(&state(true));
        assert_eq!(response.status, HealthStatus::Healthy);
        assert_eq!(response.brokers, vec!["direct".to_string(), "oauth".to_string()]);
        assert_eq!(response.sessions.total_sessions, 0);
    }

    #[tokio::test]
    async fn readiness_requires_registered_brokers() {
        let ready = readiness_handler(State(state(true))).await.into_response();
        assert_eq!(ready.status(), StatusCode::OK);

        let not_ready = readiness_handler(State(state(false))).await.into_response();
        assert_eq!(not_ready.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn health_handler_returns_ok_when_healthy() {
        let response = health_handler(State(state(true))).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
