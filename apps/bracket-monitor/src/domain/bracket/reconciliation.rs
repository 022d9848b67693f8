//! Reconciliation Policy
//!
//! Pure decision function mapping the two leg statuses observed in one
//! snapshot to the next bracket state and the single action to take.

use serde::{Deserialize, Serialize};

use super::{BracketState, ResolutionReason};
use crate::domain::order::OrderStatus;

/// Side effect requested by [`resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconciliationAction {
    /// Nothing to do.
    None,
    /// Cancel the take-profit leg.
    CancelProtective,
    /// Cancel the stop-loss leg.
    CancelStop,
    /// Both legs filled; warn, cancel nothing.
    FlagBothFilled,
}

impl ReconciliationAction {
    /// Returns true if the action issues a cancel call.
    #[must_use]
    pub const fn is_cancel(&self) -> bool {
        matches!(self, Self::CancelProtective | Self::CancelStop)
    }
}

/// Decision produced by [`resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// State the bracket ends up in once the action completes.
    pub new_state: BracketState,
    /// Action to perform.
    pub action: ReconciliationAction,
    /// Why the state changed; `None` when it did not.
    pub reason: Option<ResolutionReason>,
}

impl Resolution {
    const fn unchanged(state: BracketState) -> Self {
        Self {
            new_state: state,
            action: ReconciliationAction::None,
            reason: None,
        }
    }

    const fn to(
        new_state: BracketState,
        action: ReconciliationAction,
        reason: ResolutionReason,
    ) -> Self {
        Self {
            new_state,
            action,
            reason: Some(reason),
        }
    }
}

/// Decide what a bracket in `current` does given its legs' statuses.
///
/// Only `Active` brackets move. Rules, in order:
///
/// 1. both filled: `ResolvedUnknown`, flag, no cancel
/// 2. take-profit filled: `ResolvedProfit`, cancel the stop if it is still live
/// 3. stop filled: `ResolvedLoss`, cancel the take-profit if it is still live
/// 4. both cancelled or rejected: `ResolvedUnknown`, no cancel
/// 5. anything else: stay `Active`
///
/// Pass [`OrderStatus::Unknown`] for a leg missing from the snapshot.
#[must_use]
pub fn resolve(current: BracketState, protective: OrderStatus, stop: OrderStatus) -> Resolution {
    if !current.is_active() {
        return Resolution::unchanged(current);
    }

    match (protective, stop) {
        (OrderStatus::Filled, OrderStatus::Filled) => Resolution::to(
            BracketState::ResolvedUnknown,
            ReconciliationAction::FlagBothFilled,
            ResolutionReason::BothFilled,
        ),
        (OrderStatus::Filled, other) => Resolution::to(
            BracketState::ResolvedProfit,
            if other.is_terminal() {
                ReconciliationAction::None
            } else {
                ReconciliationAction::CancelStop
            },
            ResolutionReason::ProtectiveFilled,
        ),
        (other, OrderStatus::Filled) => Resolution::to(
            BracketState::ResolvedLoss,
            if other.is_terminal() {
                ReconciliationAction::None
            } else {
                ReconciliationAction::CancelProtective
            },
            ResolutionReason::StopFilled,
        ),
        (p, s) if p.is_dead() && s.is_dead() => Resolution::to(
            BracketState::ResolvedUnknown,
            ReconciliationAction::None,
            ResolutionReason::BothInactive,
        ),
        _ => Resolution::unchanged(current),
    }
}
