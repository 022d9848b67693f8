//! Cancellation Idempotency Guard
//!
//! Issues at most one cancel per bracket resolution, plus a single retry
//! after a failed first attempt. The attempted flag is set before the
//! gateway call is made, so a panic or timeout mid-call still counts.

use serde::{Deserialize, Serialize};

use crate::domain::shared::OrderId;

/// Hard cap on cancel calls per bracket (first attempt plus one retry).
pub const MAX_CANCEL_ATTEMPTS: u32 = 2;

/// Per-bracket record of sibling cancellation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationGuard {
    target: Option<OrderId>,
    attempts: u32,
    succeeded: bool,
    sealed: bool,
    abandoned: bool,
    last_error: Option<String>,
}

impl CancellationGuard {
    /// Claim permission to issue a cancel call against `order_id`.
    ///
    /// The first claim fixes the target. A second claim is granted only for
    /// the same target after a recorded failure. Everything else is refused.
    pub fn acquire(&mut self, order_id: &OrderId) -> bool {
        if self.sealed || self.succeeded || self.attempts >= MAX_CANCEL_ATTEMPTS {
            return false;
        }
        match &self.target {
            None => {
                self.target = Some(order_id.clone());
            }
            Some(target) if target == order_id && self.last_error.is_some() => {}
            Some(_) => return false,
        }
        self.attempts += 1;
        true
    }

    /// Record that the last claimed attempt succeeded.
    pub fn record_success(&mut self) {
        self.succeeded = true;
        self.last_error = None;
        self.sealed = true;
    }

    /// Record that the last claimed attempt failed.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }

    /// Give up on `order_id` without issuing a call, e.g. when the tick ran
    /// out of time. The guard is sealed and reports a failure.
    pub fn abandon(&mut self, order_id: &OrderId, reason: impl Into<String>) {
        if self.succeeded {
            return;
        }
        if self.target.is_none() {
            self.target = Some(order_id.clone());
        }
        self.last_error = Some(reason.into());
        self.abandoned = true;
        self.sealed = true;
    }

    /// Permanently refuse further attempts.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Whether any cancel call was ever issued.
    #[must_use]
    pub const fn is_attempted(&self) -> bool {
        self.attempts > 0
    }

    /// Number of cancel calls issued.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Order id the cancel targeted.
    #[must_use]
    pub const fn target(&self) -> Option<&OrderId> {
        self.target.as_ref()
    }

    /// Whether the cancel was acknowledged.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.succeeded
    }

    /// Whether cancellation was attempted (or abandoned) and never
    /// acknowledged.
    #[must_use]
    pub const fn failed(&self) -> bool {
        (self.attempts > 0 || self.abandoned) && !self.succeeded
    }

    /// Error from the most recent failed attempt.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}
