//! Order Gateway Port (Driven Port)
//!
//! The brokerage as the monitor sees it: place, cancel, list orders and list
//! positions. Reads are snapshots with eventual read-after-write consistency
//! and may omit purged orders.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order::{
    OrderKind, OrderSide, OrderSnapshot, OrderStatus, PositionSnapshot, TimeInForce,
};
use crate::domain::shared::{DomainError, OrderId, Symbol};

/// Order to place at the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSpec {
    /// Optional client-side id echoed back by the gateway.
    pub client_order_id: Option<String>,
    /// Instrument.
    pub symbol: Symbol,
    /// Buy or sell.
    pub side: OrderSide,
    /// Order kind.
    pub kind: OrderKind,
    /// Quantity.
    pub quantity: Decimal,
    /// Limit price (limit and stop-limit).
    pub limit_price: Option<Decimal>,
    /// Trigger price (stop and stop-limit).
    pub stop_price: Option<Decimal>,
    /// Time in force.
    pub time_in_force: TimeInForce,
}

impl OrderSpec {
    const fn base(symbol: Symbol, side: OrderSide, kind: OrderKind, quantity: Decimal) -> Self {
        Self {
            client_order_id: None,
            symbol,
            side,
            kind,
            quantity,
            limit_price: None,
            stop_price: None,
            time_in_force: TimeInForce::Gtc,
        }
    }

    /// Market order.
    #[must_use]
    pub const fn market(symbol: Symbol, side: OrderSide, quantity: Decimal) -> Self {
        Self::base(symbol, side, OrderKind::Market, quantity)
    }

    /// Limit order (take-profit leg).
    #[must_use]
    pub const fn limit(
        symbol: Symbol,
        side: OrderSide,
        quantity: Decimal,
        limit_price: Decimal,
    ) -> Self {
        let mut spec = Self::base(symbol, side, OrderKind::Limit, quantity);
        spec.limit_price = Some(limit_price);
        spec
    }

    /// Stop order (stop-loss leg).
    #[must_use]
    pub const fn stop(
        symbol: Symbol,
        side: OrderSide,
        quantity: Decimal,
        stop_price: Decimal,
    ) -> Self {
        let mut spec = Self::base(symbol, side, OrderKind::Stop, quantity);
        spec.stop_price = Some(stop_price);
        spec
    }

    /// Stop-limit order (stop-loss leg with a worst acceptable price).
    #[must_use]
    pub const fn stop_limit(
        symbol: Symbol,
        side: OrderSide,
        quantity: Decimal,
        stop_price: Decimal,
        limit_price: Decimal,
    ) -> Self {
        let mut spec = Self::base(symbol, side, OrderKind::StopLimit, quantity);
        spec.stop_price = Some(stop_price);
        spec.limit_price = Some(limit_price);
        spec
    }

    /// Set the client order id.
    #[must_use]
    pub fn with_client_order_id(mut self, id: impl Into<String>) -> Self {
        self.client_order_id = Some(id.into());
        self
    }

    /// Set time in force.
    #[must_use]
    pub const fn with_time_in_force(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = tif;
        self
    }

    /// Check field consistency before anything is sent.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidValue` for a bad symbol, a non-positive
    /// quantity, or a missing/non-positive price the kind requires.
    pub fn validate(&self) -> Result<(), DomainError> {
        self.symbol.validate()?;
        if self.quantity <= Decimal::ZERO {
            return Err(invalid("quantity", "must be positive"));
        }
        if self.kind.requires_limit_price() && !is_positive(self.limit_price) {
            return Err(invalid("limit_price", "required and must be positive"));
        }
        if self.kind.requires_stop_price() && !is_positive(self.stop_price) {
            return Err(invalid("stop_price", "required and must be positive"));
        }
        Ok(())
    }
}

fn is_positive(price: Option<Decimal>) -> bool {
    price.is_some_and(|p| p > Decimal::ZERO)
}

fn invalid(field: &str, message: &str) -> DomainError {
    DomainError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
}

/// Placement acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAck {
    /// Gateway-assigned order id.
    pub order_id: OrderId,
    /// Status at acknowledgment time.
    pub status: OrderStatus,
}

/// Gateway error.
///
/// Venue rejections are permanent; request failures, timeouts and rate
/// limits are transient.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// The venue refused the request.
    #[error("Rejected by venue: {reason}")]
    Rejected {
        /// Venue's reason.
        reason: String,
    },

    /// The order does not exist (or no longer exists).
    #[error("Order not found: {order_id}")]
    NotFound {
        /// Missing order id.
        order_id: String,
    },

    /// Credentials were refused.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Error details.
        message: String,
    },

    /// The gateway throttled the request.
    #[error("Rate limited by gateway")]
    RateLimited,

    /// The request did not complete in time.
    #[error("Gateway timeout during {operation}")]
    Timeout {
        /// Operation that timed out.
        operation: String,
    },

    /// Network or server failure.
    #[error("Gateway request failed: {message}")]
    RequestFailed {
        /// Error details.
        message: String,
    },
}

impl GatewayError {
    /// Whether the same request may succeed if sent again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RequestFailed { .. } | Self::Timeout { .. } | Self::RateLimited
        )
    }

    /// Whether the venue refused the request outright.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    /// Shorthand for a request failure.
    #[must_use]
    pub fn request_failed(message: impl Into<String>) -> Self {
        Self::RequestFailed {
            message: message.into(),
        }
    }
}

/// Port for the brokerage order gateway.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Place an order.
    async fn place_order(&self, spec: OrderSpec) -> Result<OrderAck, GatewayError>;

    /// Cancel an order.
    async fn cancel_order(&self, order_id: &OrderId) -> Result<(), GatewayError>;

    /// Snapshot of recent orders, any status.
    async fn list_orders(&self) -> Result<Vec<OrderSnapshot>, GatewayError>;

    /// Snapshot of open positions.
    async fn list_positions(&self) -> Result<Vec<PositionSnapshot>, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn limit_spec() {
        let spec = OrderSpec::limit(Symbol::new("spy"), OrderSide::Sell, dec!(10), dec!(510));
        assert_eq!(spec.kind, OrderKind::Limit);
        assert_eq!(spec.limit_price, Some(dec!(510)));
        assert_eq!(spec.time_in_force, TimeInForce::Gtc);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn stop_limit_spec() {
        let spec = OrderSpec::stop_limit(
            Symbol::new("SPY"),
            OrderSide::Sell,
            dec!(10),
            dec!(495),
            dec!(494),
        )
        .with_client_order_id("sl-abc");
        assert_eq!(spec.stop_price, Some(dec!(495)));
        assert_eq!(spec.limit_price, Some(dec!(494)));
        assert_eq!(spec.client_order_id.as_deref(), Some("sl-abc"));
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_prices() {
        let mut spec = OrderSpec::stop(Symbol::new("SPY"), OrderSide::Sell, dec!(10), dec!(495));
        spec.stop_price = None;
        assert!(spec.validate().is_err());

        let spec = OrderSpec::limit(Symbol::new("SPY"), OrderSide::Sell, dec!(0), dec!(510));
        assert!(spec.validate().is_err());

        let spec = OrderSpec::market(Symbol::new("SPY"), OrderSide::Buy, dec!(1));
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn retryable_errors() {
        assert!(GatewayError::request_failed("reset").is_retryable());
        assert!(GatewayError::RateLimited.is_retryable());
        assert!(
            GatewayError::Timeout {
                operation: "cancel".to_string()
            }
            .is_retryable()
        );
        assert!(
            !GatewayError::Rejected {
                reason: "insufficient qty".to_string()
            }
            .is_retryable()
        );
        assert!(
            !GatewayError::NotFound {
                order_id: "x".to_string()
            }
            .is_retryable()
        );
        assert!(
            !GatewayError::Unauthorized {
                message: "bad key".to_string()
            }
            .is_retryable()
        );
    }
}
