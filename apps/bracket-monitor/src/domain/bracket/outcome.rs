//! Outcome Estimate
//!
//! Display-only profit/loss derived from price deltas. Never fed back into
//! reconciliation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::PositionDirection;

/// Estimated exit price and profit/loss of a resolved bracket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeEstimate {
    /// Price the position was closed at.
    pub exit_price: Decimal,
    /// Signed profit (positive) or loss (negative).
    pub pnl: Decimal,
}

impl OutcomeEstimate {
    /// Compute the outcome of closing `quantity` at `exit_price`.
    #[must_use]
    pub fn compute(
        direction: PositionDirection,
        entry_price: Decimal,
        exit_price: Decimal,
        quantity: Decimal,
    ) -> Self {
        let per_unit = match direction {
            PositionDirection::Long => exit_price - entry_price,
            PositionDirection::Short => entry_price - exit_price,
        };
        Self {
            exit_price,
            pnl: per_unit * quantity,
        }
    }

    /// Returns true if the outcome is a gain.
    #[must_use]
    pub fn is_profit(&self) -> bool {
        self.pnl > Decimal::ZERO
    }
}
