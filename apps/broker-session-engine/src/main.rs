//! Broker Session Engine Binary
//!
//! Starts the session health supervisor and the health/metrics endpoint.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin broker-session-engine
//! ```
//!
//! # Environment Variables
//!
//! - `BROKER_SESSION_CONFIG`: Config file path (default: config/broker-session.yaml)
//! - `OTEL_ENABLED`: Enable OpenTelemetry export (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: cream-broker-session-engine)
//! - `RUST_LOG`: Log filter (default: configured level)

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use broker_session_engine::application::ports::TracingAlertSink;
use broker_session_engine::application::registry::BrokerRegistry;
use broker_session_engine::application::services::{SessionManager, SessionSupervisor};
use broker_session_engine::infrastructure::brokers::http_plugins;
use broker_session_engine::infrastructure::config::{self, Config};
use broker_session_engine::infrastructure::health::{HealthServer, HealthServerState};
use broker_session_engine::infrastructure::persistence::InMemorySessionStore;
use broker_session_engine::infrastructure::telemetry::{self, TelemetryConfig};
use broker_session_engine::init_metrics;
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let config_path = std::env::var("BROKER_SESSION_CONFIG").ok();
    let config = match config::load_config(config_path.as_deref()) {
        Ok(config) => config,
        Err(config::ConfigError::ReadError { path, .. }) if config_path.is_none() => {
            eprintln!("No config file at {path}, using defaults");
            Config::default()
        }
        Err(e) => return Err(e.into()),
    };

    let _telemetry_guard = telemetry::init_with_config(
        TelemetryConfig::from_env().with_default_level(config.observability.logging.level.clone()),
    );

    tracing::info!("Starting Broker Session Engine");

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder not installed, metrics disabled");
    }
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Broker plugins
    let registry = BrokerRegistry::new();
    for plugin in http_plugins(config.brokers.direct.clone(), config.brokers.oauth.clone())? {
        registry.register_plugin(plugin)?;
    }
    tracing::info!(brokers = ?registry.list_available(), "Broker plugins registered");

    // Session manager
    let manager = Arc::new(SessionManager::new(
        Arc::new(registry),
        Arc::new(InMemorySessionStore::new()),
        Arc::new(TracingAlertSink),
        config.manager_config(),
    ));

    // Health supervisor
    let supervisor = Arc::new(SessionSupervisor::new(
        Arc::clone(&manager),
        config.supervisor_config(),
    ));
    let supervisor_handle = supervisor.spawn(shutdown_token.clone());

    // Health server
    let bind_ip: IpAddr = config.server.bind_address.parse()?;
    let health_server = HealthServer::new(
        SocketAddr::new(bind_ip, config.server.health_port),
        Arc::new(HealthServerState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            Arc::clone(&manager),
        )),
        shutdown_token.clone(),
    );
    let health_handle = tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    tracing::info!("Broker session engine ready");

    await_shutdown(shutdown_token).await;

    if let Err(e) = supervisor_handle.await {
        tracing::warn!(error = %e, "Supervisor task ended abnormally");
    }
    if let Err(e) = health_handle.await {
        tracing::warn!(error = %e, "Health server task ended abnormally");
    }

    tracing::info!("Broker session engine stopped");
    Ok(())
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &Config) {
    tracing::info!(
        health_port = config.server.health_port,
        tick_secs = config.supervisor.tick_interval_secs,
        max_concurrent = config.supervisor.max_concurrent_validations,
        operation_timeout_secs = config.session.operation_timeout_secs,
        "Configuration loaded"
    );
    tracing::debug!(
        direct_url = %config.brokers.direct.base_url,
        oauth_url = %config.brokers.oauth.base_url,
        "Broker endpoints"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
