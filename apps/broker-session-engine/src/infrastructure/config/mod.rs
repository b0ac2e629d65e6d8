//! Configuration module for the broker session engine.
//!
//! Loads YAML with `${VAR}` / `${VAR:-default}` environment interpolation,
//! validates it, and converts it into service configurations.
//!
//! # Usage
//!
//! ```rust,ignore
//! use broker_session_engine::infrastructure::config::load_config;
//!
//! let config = load_config(Some("config/broker-session.yaml"))?;
//! let manager_config = config.manager_config();
//! ```

mod engine;
mod observability;
mod server;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use engine::{HealthSettings, RateLimitSettings, SessionSettings, SupervisorSettings};
pub use observability::{LoggingConfig, ObservabilityConfig};
pub use server::ServerConfig;

use crate::application::services::{SessionManagerConfig, SupervisorConfig};
use crate::infrastructure::brokers::direct::DirectAuthConfig;
use crate::infrastructure::brokers::oauth::OAuthConfig;

/// Default config path, overridden by `BROKER_SESSION_CONFIG`.
pub const DEFAULT_CONFIG_PATH: &str = "config/broker-session.yaml";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Broker adapter configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokersConfig {
    /// Direct-auth (TOTP) broker.
    #[serde(default)]
    pub direct: DirectAuthConfig,
    /// OAuth broker.
    #[serde(default)]
    pub oauth: OAuthConfig,
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Health endpoint configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Per-operation settings.
    #[serde(default)]
    pub session: SessionSettings,
    /// Health supervisor.
    #[serde(default)]
    pub supervisor: SupervisorSettings,
    /// Health scoring.
    #[serde(default)]
    pub health: HealthSettings,
    /// Rate limits.
    #[serde(default)]
    pub rate_limits: RateLimitSettings,
    /// Broker adapters.
    #[serde(default)]
    pub brokers: BrokersConfig,
    /// Logging.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Session manager configuration.
    #[must_use]
    pub fn manager_config(&self) -> SessionManagerConfig {
        SessionManagerConfig {
            operation_timeout: self.session.operation_timeout(),
            health: self.health.to_policy(),
            rate_limits: self.rate_limits.to_limiter_config(),
        }
    }

    /// Supervisor configuration.
    #[must_use]
    pub const fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            tick_interval: Duration::from_secs(self.supervisor.tick_interval_secs),
            max_concurrent_validations: self.supervisor.max_concurrent_validations,
            inactive_retention: Duration::from_secs(self.supervisor.inactive_retention_secs),
        }
    }
}

// ============================================
// Configuration Loading
// ============================================

/// Load configuration from a YAML file with environment variable interpolation.
///
/// # Arguments
///
/// * `path` - Optional path to the config file. Defaults to [`DEFAULT_CONFIG_PATH`].
///
/// # Errors
///
/// Returns a `ConfigError` if the file cannot be read, parsed, or validated.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or(DEFAULT_CONFIG_PATH);

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_string(),
        source: e,
    })?;

    load_config_from_string(&contents)
}

/// Load configuration from a YAML string.
///
/// # Errors
///
/// Returns a `ConfigError` if the YAML cannot be parsed or validated.
pub fn load_config_from_string(yaml: &str) -> Result<Config, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: Config = serde_yaml_bw::from_str(&interpolated)?;
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax. Unset or empty
/// variables without a default become empty strings.
fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<Option<regex::Regex>> = OnceLock::new();

    let Some(re) = ENV_VAR_REGEX
        .get_or_init(|| regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").ok())
    else {
        return input.to_string();
    };

    re.replace_all(input, |caps: &regex::Captures<'_>| {
        let default_value = caps.get(2).map_or("", |m| m.as_str());
        match std::env::var(&caps[1]) {
            Ok(v) if !v.is_empty() => v,
            _ => default_value.to_string(),
        }
    })
    .into_owned()
}

/// Validate configuration values.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.session.operation_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "session.operation_timeout_secs must be positive".to_string(),
        ));
    }

    if config.supervisor.tick_interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "supervisor.tick_interval_secs must be positive".to_string(),
        ));
    }

    if config.supervisor.max_concurrent_validations == 0 {
        return Err(ConfigError::ValidationError(
            "supervisor.max_concurrent_validations must be positive".to_string(),
        ));
    }

    let health = &config.health;
    if health.warning_threshold <= 0.0 || health.warning_threshold >= 100.0 {
        return Err(ConfigError::ValidationError(
            "health.warning_threshold must be between 0 and 100".to_string(),
        ));
    }

    if health.success_increment <= 0.0 || health.failure_penalty <= 0.0 {
        return Err(ConfigError::ValidationError(
            "health.success_increment and health.failure_penalty must be positive".to_string(),
        ));
    }

    if health.critical_failures == 0 || health.error_history_limit == 0 {
        return Err(ConfigError::ValidationError(
            "health.critical_failures and health.error_history_limit must be at least 1"
                .to_string(),
        ));
    }

    for (label, limit) in config.rate_limits.labelled() {
        if limit.max_calls == 0 || limit.window.is_zero() {
            return Err(ConfigError::ValidationError(format!(
                "rate_limits.{label} must allow at least one call per non-empty window"
            )));
        }
    }

    for (name, url) in [
        ("brokers.direct.base_url", &config.brokers.direct.base_url),
        ("brokers.oauth.base_url", &config.brokers.oauth.base_url),
        ("brokers.oauth.authorize_url", &config.brokers.oauth.authorize_url),
    ] {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "{name} must be an http(s) URL"
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::resilience::{BrokerOperation, RateLimit};

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = load_config_from_string("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.server.health_port, 8083);

        let manager = config.manager_config();
        assert_eq!(manager.operation_timeout, Duration::from_secs(30));
        assert_eq!(manager.health.critical_failures, 3);

        let supervisor = config.supervisor_config();
        assert_eq!(supervisor.tick_interval, Duration::from_secs(30));
        assert_eq!(supervisor.inactive_retention, Duration::from_secs(3600));
    }

    #[test]
    fn test_env_var_with_default_when_missing() {
        let input = "url: ${BROKER_SESSION_TEST_NONEXISTENT_VAR:-http://localhost}";
        assert_eq!(interpolate_env_vars(input), "url: http://localhost");
    }

    #[test]
    fn test_env_var_without_default_becomes_empty() {
        let input = "key: ${BROKER_SESSION_TEST_UNLIKELY_TO_EXIST}";
        assert_eq!(interpolate_env_vars(input), "key: ");
    }

    #[test]
    #[expect(clippy::literal_string_with_formatting_args)]
    fn test_env_var_with_default_uses_existing() {
        let result = interpolate_env_vars("path: ${PATH:-default}");
        assert_ne!(result, "path: default");
        assert!(result.starts_with("path: "));
    }

    #[test]
    fn test_full_config_parse() {
        let yaml = r#"
server:
  health_port: 9100
  bind_address: "127.0.0.1"

session:
  operation_timeout_secs: 10

supervisor:
  tick_interval_secs: 15
  max_concurrent_validations: 4
  inactive_retention_secs: 600

health:
  warning_threshold: 40
  critical_failures: 5

rate_limits:
  default: { max_calls: 20, window: 1 }
  operations:
    validate: { max_calls: 5, window: 1 }
  brokers:
    oauth:
      refresh: { max_calls: 1, window: 10 }

brokers:
  direct:
    base_url: "https://direct.test/api"
  oauth:
    base_url: "https://oauth.test/api/v3"
    authorize_url: "https://oauth.test/consent"
    default_token_lifetime_secs: 3600

observability:
  logging:
    level: "debug"
"#;

        let config = load_config_from_string(yaml).unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1");
        assert_eq!(config.supervisor.max_concurrent_validations, 4);
        assert_eq!(config.brokers.direct.base_url, "https://direct.test/api");
        assert_eq!(config.brokers.oauth.default_token_lifetime_secs, 3600);
        assert_eq!(config.observability.logging.level, "debug");

        let manager = config.manager_config();
        assert_eq!(manager.operation_timeout, Duration::from_secs(10));
        assert_eq!(manager.health.warning_threshold, 40.0);
        assert_eq!(manager.health.critical_failures, 5);
        assert_eq!(manager.health.success_increment, 10.0);

        let limits = manager.rate_limits;
        assert_eq!(
            limits.limit_for("direct", BrokerOperation::Validate),
            RateLimit::new(5, Duration::from_secs(1))
        );
        assert_eq!(
            limits.limit_for("oauth", BrokerOperation::Refresh),
            RateLimit::new(1, Duration::from_secs(10))
        );
        assert_eq!(
            limits.limit_for("direct", BrokerOperation::Connect),
            RateLimit::new(20, Duration::from_secs(1))
        );
    }

    #[test]
    fn test_validation_zero_tick() {
        let err = load_config_from_string("supervisor:\n  tick_interval_secs: 0\n").unwrap_err();
        assert!(err.to_string().contains("tick_interval_secs"));
    }

    #[test]
    fn test_validation_warning_threshold_out_of_range() {
        let err = load_config_from_string("health:\n  warning_threshold: 150\n").unwrap_err();
        assert!(err.to_string().contains("warning_threshold"));
    }

    #[test]
    fn test_validation_empty_rate_limit() {
        let yaml = "rate_limits:\n  operations:\n    refresh: { max_calls: 0, window: 1 }\n";
        let err = load_config_from_string(yaml).unwrap_err();
        assert!(err.to_string().contains("rate_limits.refresh"));
    }

    #[test]
    fn test_validation_bad_broker_url() {
        let yaml = "brokers:\n  direct:\n    base_url: \"ftp://nope\"\n";
        let err = load_config_from_string(yaml).unwrap_err();
        assert!(err.to_string().contains("brokers.direct.base_url"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "supervisor:\n  max_concurrent_validations: 2").unwrap();

        let config = load_config(file.path().to_str()).unwrap();
        assert_eq!(config.supervisor.max_concurrent_validations, 2);
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/broker-session.yaml");
        let config = load_config(Some(path)).unwrap();
        assert_eq!(config.supervisor.tick_interval_secs, 30);
        assert_eq!(config.health.critical_failures, 3);
        assert_eq!(config.session.operation_timeout_secs, 30);
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = load_config(Some("/nonexistent/broker-session.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }
}
