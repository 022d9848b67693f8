//! Bounded retry policies with exponential backoff.
//!
//! Each call site picks its own policy:
//!
//! | Call site | Attempts | Retry on |
//! |-----------|----------|----------|
//! | Order list fetch (per tick) | 1 | never, the next tick is the retry |
//! | Sibling cancel | 2 | request failures, timeouts, rate limits |
//! | HTTP transport (GET only) | 3 | 408, 429, 5xx, connect errors |
//!
//! `max_attempts` counts every call including the first, so a policy with
//! `max_attempts = 1` never sleeps.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Retry policy for one call site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first call.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound for any single delay.
    pub max_backoff: Duration,
    /// Growth factor between consecutive delays.
    pub backoff_multiplier: f64,
    /// Jitter factor (0.2 = ±20%).
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::transport()
    }
}

impl RetryPolicy {
    /// Create a retry policy with custom settings.
    #[must_use]
    pub const fn new(
        max_attempts: u32,
        initial_backoff: Duration,
        max_backoff: Duration,
        backoff_multiplier: f64,
        jitter_factor: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            max_backoff,
            backoff_multiplier,
            jitter_factor,
        }
    }

    /// Per-tick order fetch: a single attempt.
    #[must_use]
    pub const fn fetch() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO, 1.0, 0.0)
    }

    /// Sibling cancellation: first call plus one retry after 500ms.
    #[must_use]
    pub const fn cancel() -> Self {
        Self::new(
            2,
            Duration::from_millis(500),
            Duration::from_secs(5),
            2.0,
            0.1,
        )
    }

    /// Transport-level retry for idempotent reads.
    #[must_use]
    pub const fn transport() -> Self {
        Self::new(
            3,
            Duration::from_millis(100),
            Duration::from_secs(10),
            2.0,
            0.2,
        )
    }

    /// Same policy with `max_attempts` clamped to `cap`.
    #[must_use]
    pub fn capped(mut self, cap: u32) -> Self {
        self.max_attempts = self.max_attempts.clamp(1, cap.max(1));
        self
    }

    /// Number of retries after the first call.
    #[must_use]
    pub const fn retries(&self) -> u32 {
        self.max_attempts.saturating_sub(1)
    }
}

/// Calculator for exponential backoff with jitter.
#[derive(Debug)]
pub struct ExponentialBackoffCalculator {
    retries_used: u32,
    max_retries: u32,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
    backoff_multiplier: f64,
    jitter_factor: f64,
}

impl ExponentialBackoffCalculator {
    /// Create a calculator for one logical request under `policy`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn new(policy: &RetryPolicy) -> Self {
        Self {
            retries_used: 0,
            max_retries: policy.retries(),
            initial_backoff_ms: policy.initial_backoff.as_millis() as u64,
            max_backoff_ms: policy.max_backoff.as_millis() as u64,
            backoff_multiplier: policy.backoff_multiplier,
            jitter_factor: policy.jitter_factor,
        }
    }

    /// Delay before the next retry, or `None` once retries are exhausted.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self.retries_used >= self.max_retries {
            return None;
        }

        let base_ms = self.base_backoff_ms();
        let capped_ms = self.apply_jitter(base_ms).min(self.max_backoff_ms);
        self.retries_used += 1;

        Some(Duration::from_millis(capped_ms))
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_possible_wrap,
        clippy::cast_precision_loss
    )]
    fn base_backoff_ms(&self) -> u64 {
        let multiplier = self.backoff_multiplier.powi(self.retries_used as i32);
        let backoff = (self.initial_backoff_ms as f64 * multiplier) as u64;
        backoff.min(self.max_backoff_ms)
    }

    // Uniform in [backoff * (1 - jitter), backoff * (1 + jitter)].
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn apply_jitter(&self, backoff_ms: u64) -> u64 {
        if self.jitter_factor <= 0.0 || backoff_ms == 0 {
            return backoff_ms;
        }
        let spread = backoff_ms as f64 * self.jitter_factor;
        let min = (backoff_ms as f64 - spread).max(0.0);
        let max = backoff_ms as f64 + spread;
        rand::rng().random_range(min..=max) as u64
    }

    /// Retries handed out so far.
    #[must_use]
    pub const fn retries_used(&self) -> u32 {
        self.retries_used
    }

    /// Whether another retry is available.
    #[must_use]
    pub const fn has_remaining_attempts(&self) -> bool {
        self.retries_used < self.max_retries
    }
}

/// Whether an HTTP status is worth retrying on an idempotent request.
#[must_use]
pub fn is_retryable_status(status_code: u16) -> bool {
    matches!(status_code, 408 | 429) || (500..600).contains(&status_code)
}

/// Parse a `Retry-After` header given in seconds.
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
