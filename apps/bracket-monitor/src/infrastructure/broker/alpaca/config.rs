//! Alpaca adapter configuration.

use std::fmt;
use std::time::Duration;

use crate::broker::RetryPolicy;

/// Environment for the Alpaca trading API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AlpacaEnvironment {
    /// Paper trading (simulated).
    #[default]
    Paper,
    /// Live trading (real money).
    Live,
}

impl AlpacaEnvironment {
    /// Base URL for the trading API.
    #[must_use]
    pub const fn trading_base_url(&self) -> &'static str {
        match self {
            Self::Paper => "https://paper-api.alpaca.markets",
            Self::Live => "https://api.alpaca.markets",
        }
    }

    /// Check if this is live trading.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }
}

impl fmt::Display for AlpacaEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Paper => write!(f, "PAPER"),
            Self::Live => write!(f, "LIVE"),
        }
    }
}

/// Configuration for the Alpaca gateway adapter.
#[derive(Clone)]
pub struct AlpacaConfig {
    /// API key id.
    pub api_key: String,
    /// API secret.
    pub api_secret: String,
    /// Trading environment.
    pub environment: AlpacaEnvironment,
    /// Overrides the environment's base URL (tests, proxies).
    pub base_url: Option<String>,
    /// HTTP request timeout.
    pub timeout: Duration,
    /// Transport retry for GET requests. Never applied to POST or DELETE.
    pub retry: RetryPolicy,
}

impl AlpacaConfig {
    /// Create a new configuration.
    #[must_use]
    pub fn new(
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        environment: AlpacaEnvironment,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            environment,
            base_url: None,
            timeout: Duration::from_secs(10),
            retry: RetryPolicy::transport(),
        }
    }

    /// Set the HTTP timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the transport retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Point the adapter at a different host.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Trading API base URL, without a trailing slash.
    #[must_use]
    pub fn trading_base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.environment.trading_base_url())
            .trim_end_matches('/')
    }
}

impl fmt::Debug for AlpacaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlpacaConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_secret", &"***")
            .field("environment", &self.environment)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

fn redact(key: &str) -> String {
    let visible: String = key.chars().take(4).collect();
    format!("{visible}***")
}
