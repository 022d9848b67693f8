//! Monitor options and construction-time validation.

use std::collections::HashSet;
use std::time::Duration;

use thiserror::Error;

use crate::broker::RetryPolicy;
use crate::domain::bracket::{Bracket, BracketState};

/// Default polling interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Default session length in ticks (six hours at the default interval).
pub const DEFAULT_MAX_TICKS: u64 = 360;

/// Polling configuration for one monitor session.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorOptions {
    /// Time between ticks.
    pub interval: Duration,
    /// Ticks after which still-active brackets expire.
    pub max_ticks: u64,
    /// Per-request timeout. Defaults to half the interval.
    pub request_timeout: Option<Duration>,
    /// Retry policy for sibling cancellation (capped at two attempts).
    pub cancel_retry: RetryPolicy,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            max_ticks: DEFAULT_MAX_TICKS,
            request_timeout: None,
            cancel_retry: RetryPolicy::cancel(),
        }
    }
}

impl MonitorOptions {
    /// Set the polling interval.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the session length in ticks.
    #[must_use]
    pub const fn with_max_ticks(mut self, max_ticks: u64) -> Self {
        self.max_ticks = max_ticks;
        self
    }

    /// Set the per-request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set the cancel retry policy.
    #[must_use]
    pub fn with_cancel_retry(mut self, policy: RetryPolicy) -> Self {
        self.cancel_retry = policy;
        self
    }

    /// Timeout applied to each gateway call.
    #[must_use]
    pub fn effective_request_timeout(&self) -> Duration {
        self.request_timeout.unwrap_or(self.interval / 2)
    }

    /// Validate the options on their own.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError` for a zero interval, zero `max_ticks`, or a
    /// request timeout that is zero or not shorter than the interval.
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.interval.is_zero() {
            return Err(MonitorError::ZeroInterval);
        }
        if self.max_ticks == 0 {
            return Err(MonitorError::ZeroMaxTicks);
        }
        let timeout = self.effective_request_timeout();
        if timeout.is_zero() || timeout >= self.interval {
            return Err(MonitorError::InvalidRequestTimeout {
                timeout,
                interval: self.interval,
            });
        }
        Ok(())
    }

    /// Validate options together with the brackets to be watched.
    ///
    /// # Errors
    ///
    /// Everything [`validate`](Self::validate) reports, plus an empty set,
    /// duplicate bracket ids and brackets that are not `Active`.
    pub fn validate_session(&self, brackets: &[Bracket]) -> Result<(), MonitorError> {
        if brackets.is_empty() {
            return Err(MonitorError::NoBrackets);
        }
        self.validate()?;

        let mut seen = HashSet::with_capacity(brackets.len());
        for bracket in brackets {
            if !seen.insert(bracket.id()) {
                return Err(MonitorError::DuplicateBracket {
                    bracket_id: bracket.id().to_string(),
                });
            }
            if bracket.state() != BracketState::Active {
                return Err(MonitorError::BracketNotActive {
                    bracket_id: bracket.id().to_string(),
                    state: bracket.state(),
                });
            }
        }
        Ok(())
    }
}

/// Errors raised synchronously when a monitor is started.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MonitorError {
    /// Nothing to watch.
    #[error("monitor requires at least one bracket")]
    NoBrackets,

    /// Interval of zero.
    #[error("polling interval must be greater than zero")]
    ZeroInterval,

    /// `max_ticks` of zero.
    #[error("max_ticks must be greater than zero")]
    ZeroMaxTicks,

    /// Request timeout is zero or does not fit inside one interval.
    #[error("request timeout {timeout:?} must be non-zero and shorter than interval {interval:?}")]
    InvalidRequestTimeout {
        /// Effective timeout.
        timeout: Duration,
        /// Polling interval.
        interval: Duration,
    },

    /// Two brackets share an id.
    #[error("duplicate bracket id: {bracket_id}")]
    DuplicateBracket {
        /// Repeated id.
        bracket_id: String,
    },

    /// A bracket has already left `Active`.
    #[error("bracket {bracket_id} is {state}, only ACTIVE brackets can be monitored")]
    BracketNotActive {
        /// Bracket id.
        bracket_id: String,
        /// Its state.
        state: BracketState,
    },

    /// The monitoring task panicked or was aborted.
    #[error("monitor task failed: {message}")]
    TaskFailed {
        /// Error details.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bracket::{BracketLeg, PositionDirection};
    use crate::domain::shared::{BracketId, Symbol};
    use rust_decimal_macros::dec;

    fn bracket(id: &str) -> Bracket {
        Bracket::new(
            BracketId::new(id),
            Symbol::new("SPY"),
            PositionDirection::Long,
            dec!(1),
            BracketLeg::new(format!("{id}-tp")),
            BracketLeg::new(format!("{id}-sl")),
        )
        .unwrap()
    }

    #[test]
    fn defaults() {
        let options = MonitorOptions::default();
        assert_eq!(options.interval, Duration::from_secs(60));
        assert_eq!(options.max_ticks, 360);
        assert_eq!(options.effective_request_timeout(), Duration::from_secs(30));
        assert_eq!(options.cancel_retry.max_attempts, 2);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn rejects_zero_interval_and_ticks() {
        let options = MonitorOptions::default().with_interval(Duration::ZERO);
        assert_eq!(options.validate(), Err(MonitorError::ZeroInterval));

        let options = MonitorOptions::default().with_max_ticks(0);
        assert_eq!(options.validate(), Err(MonitorError::ZeroMaxTicks));
    }

    #[test]
    fn rejects_timeout_not_shorter_than_interval() {
        let options = MonitorOptions::default()
            .with_interval(Duration::from_secs(10))
            .with_request_timeout(Duration::from_secs(10));
        assert!(matches!(
            options.validate(),
            Err(MonitorError::InvalidRequestTimeout { .. })
        ));

        let options = MonitorOptions::default().with_request_timeout(Duration::from_secs(59));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn rejects_empty_and_duplicate_sets() {
        let options = MonitorOptions::default();
        assert_eq!(options.validate_session(&[]), Err(MonitorError::NoBrackets));
        assert!(matches!(
            options.validate_session(&[bracket("a"), bracket("a")]),
            Err(MonitorError::DuplicateBracket { .. })
        ));
        assert!(options.validate_session(&[bracket("a"), bracket("b")]).is_ok());
    }

    #[test]
    fn rejects_non_active_bracket() {
        let mut resolved = bracket("a");
        resolved.transition_to(BracketState::Expired).unwrap();
        assert!(matches!(
            MonitorOptions::default().validate_session(&[resolved]),
            Err(MonitorError::BracketNotActive { .. })
        ));
    }
}
