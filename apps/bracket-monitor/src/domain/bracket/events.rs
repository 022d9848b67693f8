//! Bracket events: per-transition records and the final resolution report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Bracket, BracketState, OutcomeEstimate};
use crate::domain::shared::{BracketId, OrderId, Symbol};

/// Why a bracket changed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionReason {
    /// Take-profit order filled.
    ProtectiveFilled,
    /// Stop-loss order filled.
    StopFilled,
    /// Both legs reported filled in the same snapshot.
    BothFilled,
    /// Both legs cancelled or rejected without a fill.
    BothInactive,
    /// Session ran out of ticks.
    SessionExpired,
}

impl ResolutionReason {
    /// Returns true for reasons that deserve operator attention.
    #[must_use]
    pub const fn is_warning(&self) -> bool {
        matches!(self, Self::BothFilled | Self::BothInactive | Self::SessionExpired)
    }
}

impl fmt::Display for ResolutionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProtectiveFilled => write!(f, "take-profit filled"),
            Self::StopFilled => write!(f, "stop-loss filled"),
            Self::BothFilled => write!(f, "both legs filled"),
            Self::BothInactive => write!(f, "both legs cancelled or rejected"),
            Self::SessionExpired => write!(f, "monitoring session expired"),
        }
    }
}

/// One state change of one bracket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// When the transition happened.
    pub at: DateTime<Utc>,
    /// Bracket id.
    pub bracket_id: BracketId,
    /// Previous state.
    pub from: BracketState,
    /// New state.
    pub to: BracketState,
    /// Why.
    pub reason: ResolutionReason,
    /// Profit/loss estimate, when it can be derived.
    pub outcome: Option<OutcomeEstimate>,
}

/// Terminal result of one bracket, delivered once to every `on_resolved`
/// subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionReport {
    /// Bracket id.
    pub bracket_id: BracketId,
    /// Instrument.
    pub symbol: Symbol,
    /// Terminal state.
    pub state: BracketState,
    /// Why it resolved.
    pub reason: ResolutionReason,
    /// Sibling order the monitor tried to cancel.
    pub cancelled_order_id: Option<OrderId>,
    /// Cancel was attempted and never acknowledged. The sibling may still be
    /// live at the gateway.
    pub cancellation_failed: bool,
    /// Last cancel error.
    pub cancellation_error: Option<String>,
    /// Number of cancel calls issued.
    pub cancel_attempts: u32,
    /// Profit/loss estimate.
    pub outcome: Option<OutcomeEstimate>,
    /// Tick on which the bracket resolved.
    pub ticks: u64,
    /// When it resolved.
    pub resolved_at: DateTime<Utc>,
}

impl ResolutionReport {
    /// Build the report for a bracket that just reached a terminal state.
    #[must_use]
    pub fn from_bracket(
        bracket: &Bracket,
        reason: ResolutionReason,
        outcome: Option<OutcomeEstimate>,
        ticks: u64,
    ) -> Self {
        let guard = bracket.cancellation();
        Self {
            bracket_id: bracket.id().clone(),
            symbol: bracket.symbol().clone(),
            state: bracket.state(),
            reason,
            cancelled_order_id: guard.target().cloned(),
            cancellation_failed: guard.failed(),
            cancellation_error: guard.last_error().map(str::to_string),
            cancel_attempts: guard.attempts(),
            outcome,
            ticks,
            resolved_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bracket::{BracketLeg, PositionDirection};
    use rust_decimal_macros::dec;

    #[test]
    fn warning_reasons() {
        assert!(!ResolutionReason::ProtectiveFilled.is_warning());
        assert!(!ResolutionReason::StopFilled.is_warning());
        assert!(ResolutionReason::BothFilled.is_warning());
        assert!(ResolutionReason::SessionExpired.is_warning());
    }

    #[test]
    fn report_carries_cancel_failure() {
        let mut bracket = Bracket::new(
            BracketId::new("b-1"),
            Symbol::new("SPY"),
            PositionDirection::Long,
            dec!(10),
            BracketLeg::new("tp-1"),
            BracketLeg::new("sl-1"),
        )
        .unwrap();
        bracket.transition_to(BracketState::Resolving).unwrap();
        let stop = bracket.stop_order_id().clone();
        assert!(bracket.cancellation_mut().acquire(&stop));
        bracket.cancellation_mut().record_failure("503");
        bracket.transition_to(BracketState::ResolvedProfit).unwrap();

        let report = ResolutionReport::from_bracket(&bracket, ResolutionReason::ProtectiveFilled, None, 2);
        assert_eq!(report.state, BracketState::ResolvedProfit);
        assert!(report.cancellation_failed);
        assert_eq!(report.cancellation_error.as_deref(), Some("503"));
        assert_eq!(report.cancelled_order_id, Some(stop));
        assert_eq!(report.cancel_attempts, 1);
        assert_eq!(report.ticks, 2);
    }
}
