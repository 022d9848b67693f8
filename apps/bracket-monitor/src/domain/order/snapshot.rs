//! Point-in-time views of gateway orders and positions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::value_objects::{OrderKind, OrderSide, OrderStatus};
use crate::domain::shared::{OrderId, Symbol};

/// One order as reported by the gateway at `observed_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    /// Gateway-assigned order id.
    pub order_id: OrderId,
    /// Instrument.
    pub symbol: Symbol,
    /// Buy or sell.
    pub side: OrderSide,
    /// Market, limit, stop or stop-limit.
    pub kind: OrderKind,
    /// Ordered quantity.
    pub quantity: Decimal,
    /// Limit price, when the kind carries one.
    pub limit_price: Option<Decimal>,
    /// Trigger price, when the kind carries one.
    pub stop_price: Option<Decimal>,
    /// Average fill price, once any quantity has filled.
    pub filled_price: Option<Decimal>,
    /// Current status.
    pub status: OrderStatus,
    /// When the snapshot was taken.
    pub observed_at: DateTime<Utc>,
}

impl OrderSnapshot {
    /// Create a snapshot with no prices set.
    #[must_use]
    pub fn new(
        order_id: OrderId,
        symbol: Symbol,
        side: OrderSide,
        kind: OrderKind,
        quantity: Decimal,
        status: OrderStatus,
    ) -> Self {
        Self {
            order_id,
            symbol,
            side,
            kind,
            quantity,
            limit_price: None,
            stop_price: None,
            filled_price: None,
            status,
            observed_at: Utc::now(),
        }
    }

    /// Set the limit price.
    #[must_use]
    pub const fn with_limit_price(mut self, price: Decimal) -> Self {
        self.limit_price = Some(price);
        self
    }

    /// Set the trigger price.
    #[must_use]
    pub const fn with_stop_price(mut self, price: Decimal) -> Self {
        self.stop_price = Some(price);
        self
    }

    /// Set the average fill price.
    #[must_use]
    pub const fn with_filled_price(mut self, price: Decimal) -> Self {
        self.filled_price = Some(price);
        self
    }

    /// Best available execution price: the fill price, else the resting price.
    #[must_use]
    pub fn effective_price(&self) -> Option<Decimal> {
        self.filled_price.or(self.limit_price).or(self.stop_price)
    }
}

/// Net position in one instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    /// Instrument.
    pub symbol: Symbol,
    /// Signed quantity: positive long, negative short.
    pub net_quantity: Decimal,
    /// Average entry price.
    pub avg_price: Decimal,
}

impl PositionSnapshot {
    /// Returns true for a long position.
    #[must_use]
    pub fn is_long(&self) -> bool {
        self.net_quantity > Decimal::ZERO
    }

    /// Returns true for a short position.
    #[must_use]
    pub fn is_short(&self) -> bool {
        self.net_quantity < Decimal::ZERO
    }
}
