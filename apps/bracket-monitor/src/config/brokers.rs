//! Broker connection settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::broker::RetryPolicy;
use crate::infrastructure::broker::{AlpacaConfig, AlpacaEnvironment};

/// Environment variable consulted when `api_key` is empty.
pub const API_KEY_ENV: &str = "ALPACA_KEY";
/// Environment variable consulted when `api_secret` is empty.
pub const API_SECRET_ENV: &str = "ALPACA_SECRET";

/// Alpaca broker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// API key.
    #[serde(default)]
    pub api_key: String,
    /// API secret.
    #[serde(default)]
    pub api_secret: String,
    /// Trading mode, `PAPER` or `LIVE`.
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Overrides the environment's trading URL.
    #[serde(default)]
    pub base_url: Option<String>,
    /// HTTP timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Transport retry for idempotent reads.
    #[serde(default)]
    pub retry: TransportRetryConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_secret: String::new(),
            environment: default_environment(),
            base_url: None,
            timeout_secs: default_timeout_secs(),
            retry: TransportRetryConfig::default(),
        }
    }
}

impl BrokerConfig {
    /// Parsed trading environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` for anything but PAPER or LIVE.
    pub fn trading_environment(&self) -> Result<AlpacaEnvironment, ConfigError> {
        match self.environment.to_ascii_uppercase().as_str() {
            "PAPER" => Ok(AlpacaEnvironment::Paper),
            "LIVE" => Ok(AlpacaEnvironment::Live),
            other => Err(ConfigError::ValidationError(format!(
                "broker.environment must be PAPER or LIVE, got {other:?}"
            ))),
        }
    }

    /// Fill empty credentials from `ALPACA_KEY` / `ALPACA_SECRET`.
    pub fn fill_credentials_from_env(&mut self) {
        if self.api_key.is_empty()
            && let Ok(key) = std::env::var(API_KEY_ENV)
        {
            self.api_key = key;
        }
        if self.api_secret.is_empty()
            && let Ok(secret) = std::env::var(API_SECRET_ENV)
        {
            self.api_secret = secret;
        }
    }

    /// Whether both credentials are present.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.api_key.trim().is_empty() && !self.api_secret.trim().is_empty()
    }

    /// Build the adapter configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` for an unknown environment.
    pub fn to_alpaca_config(&self) -> Result<AlpacaConfig, ConfigError> {
        let mut config = AlpacaConfig::new(
            self.api_key.clone(),
            self.api_secret.clone(),
            self.trading_environment()?,
        )
        .with_timeout(Duration::from_secs(self.timeout_secs))
        .with_retry(self.retry.to_policy());
        if let Some(url) = &self.base_url {
            config = config.with_base_url(url.clone());
        }
        Ok(config)
    }
}

/// Transport retry settings for GET requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportRetryConfig {
    /// Total attempts including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Cap on any single delay.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for TransportRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl TransportRetryConfig {
    /// Convert into a retry policy, keeping the transport multiplier and jitter.
    #[must_use]
    pub fn to_policy(&self) -> RetryPolicy {
        let base = RetryPolicy::transport();
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
            base.backoff_multiplier,
            base.jitter_factor,
        )
    }
}

fn default_environment() -> String {
    "PAPER".to_string()
}

const fn default_timeout_secs() -> u64 {
    10
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    100
}

const fn default_max_backoff_ms() -> u64 {
    10_000
}
