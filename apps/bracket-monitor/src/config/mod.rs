//! Configuration loading for the bracket monitor.
//!
//! YAML file with environment variable interpolation. Every section is
//! optional; a missing default file yields the built-in defaults.
//!
//! ```yaml
//! broker:
//!   api_key: ${ALPACA_KEY}
//!   api_secret: ${ALPACA_SECRET}
//!   environment: ${TRADING_MODE:-PAPER}
//! monitor:
//!   interval_secs: 60
//!   max_ticks: 360
//! observability:
//!   logging:
//!     format: json
//!   metrics_port: 9090
//! ```

mod brokers;
mod monitor;
mod observability;
mod validation;

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use brokers::{API_KEY_ENV, API_SECRET_ENV, BrokerConfig, TransportRetryConfig};
pub use monitor::MonitorConfig;
pub use observability::{LoggingConfig, ObservabilityConfig};
pub use validation::{RunMode, StartupValidation, StartupValidationError, validate_startup};

use crate::domain::bracket::MAX_CANCEL_ATTEMPTS;

/// File read when no path is given.
pub const DEFAULT_CONFIG_PATH: &str = "bracket-monitor.yaml";

const LOG_FORMATS: [&str; 3] = ["pretty", "json", "compact"];

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

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Broker connection.
    #[serde(default)]
    pub broker: BrokerConfig,
    /// Polling monitor.
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// Logging and metrics.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ============================================
// Configuration Loading
// ============================================

/// Load configuration.
///
/// With an explicit `path` the file must exist. Without one,
/// [`DEFAULT_CONFIG_PATH`] is read if present and defaults are used
/// otherwise. Empty credentials are then filled from `ALPACA_KEY` and
/// `ALPACA_SECRET`.
///
/// # Errors
///
/// Returns a `ConfigError` if the file cannot be read, parsed, or validated.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(path) => read_config_file(path)?,
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_PATH);
            if default_path.exists() {
                read_config_file(default_path)?
            } else {
                tracing::debug!(path = DEFAULT_CONFIG_PATH, "No config file, using defaults");
                Config::default()
            }
        }
    };

    config.broker.fill_credentials_from_env();
    validate_config(&config)?;
    Ok(config)
}

/// Load configuration from a YAML string (useful for testing).
///
/// # Errors
///
/// Returns a `ConfigError` if the YAML cannot be parsed or validated.
pub fn load_config_from_string(yaml: &str) -> Result<Config, ConfigError> {
    let config = parse(yaml)?;
    validate_config(&config)?;
    Ok(config)
}

fn read_config_file(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    parse(&contents)
}

fn parse(yaml: &str) -> Result<Config, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    if interpolated.trim().is_empty() {
        return Ok(Config::default());
    }
    Ok(serde_yaml_bw::from_str(&interpolated)?)
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax.
#[allow(clippy::expect_used)] // Regex is compile-time constant; expect() is safe here
fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    re.replace_all(input, |cap: &regex::Captures<'_>| {
        let default_value = cap.get(2).map_or("", |m| m.as_str());
        match std::env::var(&cap[1]) {
            Ok(v) if !v.is_empty() => v,
            _ => default_value.to_string(),
        }
    })
    .into_owned()
}

/// Validate configuration values.
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` naming the first offending field.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let broker = &config.broker;
    broker.trading_environment()?;

    if broker.timeout_secs == 0 {
        return Err(invalid("broker.timeout_secs must be positive"));
    }
    if broker.retry.max_attempts == 0 {
        return Err(invalid("broker.retry.max_attempts must be at least 1"));
    }
    if broker.retry.initial_backoff_ms > broker.retry.max_backoff_ms {
        return Err(invalid(
            "broker.retry.initial_backoff_ms must not exceed max_backoff_ms",
        ));
    }

    let monitor = &config.monitor;
    if monitor.interval_secs == 0 {
        return Err(invalid("monitor.interval_secs must be positive"));
    }
    if monitor.max_ticks == 0 {
        return Err(invalid("monitor.max_ticks must be positive"));
    }
    if let Some(timeout) = monitor.request_timeout_secs
        && (timeout == 0 || timeout >= monitor.interval_secs)
    {
        return Err(invalid(
            "monitor.request_timeout_secs must be positive and shorter than interval_secs",
        ));
    }
    if !(1..=MAX_CANCEL_ATTEMPTS).contains(&monitor.cancel_max_attempts) {
        return Err(ConfigError::ValidationError(format!(
            "monitor.cancel_max_attempts must be between 1 and {MAX_CANCEL_ATTEMPTS}"
        )));
    }

    let logging = &config.observability.logging;
    if !LOG_FORMATS.contains(&logging.format.as_str()) {
        return Err(ConfigError::ValidationError(format!(
            "observability.logging.format must be one of: {LOG_FORMATS:?}"
        )));
    }
    if config.observability.metrics_port == Some(0) {
        return Err(invalid("observability.metrics_port must be non-zero"));
    }

    Ok(())
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::ValidationError(message.to_string())
}
