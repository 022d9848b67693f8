//! Startup checks that depend on how the gateway will be run.

use std::fmt;

use super::Config;
use super::brokers::{API_KEY_ENV, API_SECRET_ENV};

/// Which gateway the process talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// In-memory simulated gateway; no credentials used.
    Simulate,
    /// Alpaca paper trading.
    Paper,
    /// Alpaca live trading.
    Live,
}

impl RunMode {
    /// Whether real orders are at stake.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simulate => write!(f, "SIMULATE"),
            Self::Paper => write!(f, "PAPER"),
            Self::Live => write!(f, "LIVE"),
        }
    }
}

/// Errors from startup validation.
#[derive(Debug, thiserror::Error)]
pub enum StartupValidationError {
    /// Missing required credentials for the mode.
    #[error("Missing required credentials for {mode} mode: {details}")]
    MissingCredentials {
        /// The run mode.
        mode: RunMode,
        /// Which credentials are missing.
        details: String,
    },
}

/// Result of startup validation.
#[derive(Debug)]
pub struct StartupValidation {
    /// Non-fatal findings to log.
    pub warnings: Vec<String>,
}

impl StartupValidation {
    const fn ok_with_warnings(warnings: Vec<String>) -> Self {
        Self { warnings }
    }
}

/// Check credentials and URLs against the run mode.
///
/// # Errors
///
/// Returns `StartupValidationError::MissingCredentials` when PAPER or LIVE
/// mode lacks a key or secret.
pub fn validate_startup(
    config: &Config,
    mode: RunMode,
) -> Result<StartupValidation, StartupValidationError> {
    let broker = &config.broker;
    let mut warnings = Vec::new();

    if mode == RunMode::Simulate {
        if broker.has_credentials() {
            warnings.push("Alpaca credentials configured but not used in SIMULATE mode".to_string());
        }
        return Ok(StartupValidation::ok_with_warnings(warnings));
    }

    let mut missing = Vec::new();
    if broker.api_key.trim().is_empty() {
        missing.push(API_KEY_ENV);
    }
    if broker.api_secret.trim().is_empty() {
        missing.push(API_SECRET_ENV);
    }
    if !missing.is_empty() {
        return Err(StartupValidationError::MissingCredentials {
            mode,
            details: format!(
                "not set: {}. Set them in the environment or under broker in the config file.",
                missing.join(", ")
            ),
        });
    }

    if mode.is_live()
        && let Some(url) = &broker.base_url
        && url.contains("paper")
    {
        warnings.push(
            "LIVE mode configured but using paper API URL. This may indicate misconfiguration."
                .to_string(),
        );
    }

    Ok(StartupValidation::ok_with_warnings(warnings))
}
