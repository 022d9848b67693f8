//! Polling monitor settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::application::services::{DEFAULT_INTERVAL, DEFAULT_MAX_TICKS, MonitorOptions};
use crate::broker::RetryPolicy;

/// Monitor loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between ticks.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Ticks before unresolved brackets expire.
    #[serde(default = "default_max_ticks")]
    pub max_ticks: u64,
    /// Per-request timeout; half the interval when unset.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    /// Cancel attempts per bracket (1 or 2).
    #[serde(default = "default_cancel_max_attempts")]
    pub cancel_max_attempts: u32,
    /// Delay before the cancel retry.
    #[serde(default = "default_cancel_initial_backoff_ms")]
    pub cancel_initial_backoff_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_ticks: default_max_ticks(),
            request_timeout_secs: None,
            cancel_max_attempts: default_cancel_max_attempts(),
            cancel_initial_backoff_ms: default_cancel_initial_backoff_ms(),
        }
    }
}

impl MonitorConfig {
    /// Build monitor options from these settings.
    #[must_use]
    pub fn to_options(&self) -> MonitorOptions {
        let base = RetryPolicy::cancel();
        let cancel_retry = RetryPolicy::new(
            self.cancel_max_attempts,
            Duration::from_millis(self.cancel_initial_backoff_ms),
            base.max_backoff,
            base.backoff_multiplier,
            base.jitter_factor,
        );
        let mut options = MonitorOptions::default()
            .with_interval(Duration::from_secs(self.interval_secs))
            .with_max_ticks(self.max_ticks)
            .with_cancel_retry(cancel_retry);
        if let Some(secs) = self.request_timeout_secs {
            options = options.with_request_timeout(Duration::from_secs(secs));
        }
        options
    }
}

const fn default_interval_secs() -> u64 {
    DEFAULT_INTERVAL.as_secs()
}

const fn default_max_ticks() -> u64 {
    DEFAULT_MAX_TICKS
}

const fn default_cancel_max_attempts() -> u32 {
    2
}

const fn default_cancel_initial_backoff_ms() -> u64 {
    500
}
