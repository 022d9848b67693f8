//! Place Bracket Use Case
//!
//! Places the take-profit and stop-loss orders for an open position and
//! returns an active [`Bracket`] only when both are acknowledged.

use std::sync::Arc;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::application::ports::{GatewayError, OrderGateway, OrderSpec};
use crate::domain::bracket::{Bracket, BracketError, BracketLeg, PositionDirection};
use crate::domain::order::TimeInForce;
use crate::domain::shared::{BracketId, DomainError, OrderId, Symbol};
use crate::observability;

/// Request to protect a position with a bracket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceBracketRequest {
    /// Instrument.
    pub symbol: Symbol,
    /// Take-profit limit price.
    pub take_profit: Decimal,
    /// Stop-loss trigger price.
    pub stop_loss: Decimal,
    /// Worst acceptable price once the stop triggers; plain stop when `None`.
    pub stop_limit: Option<Decimal>,
    /// Quantity to protect. Taken from the open position when `None`.
    pub quantity: Option<Decimal>,
    /// Position direction. Taken from the open position when `None`.
    pub direction: Option<PositionDirection>,
    /// Entry price for outcome estimates. Taken from the open position when `None`.
    pub entry_price: Option<Decimal>,
    /// Order that opened the position, if known.
    pub entry_order_id: Option<OrderId>,
    /// Time in force for both legs.
    pub time_in_force: TimeInForce,
}

impl PlaceBracketRequest {
    /// Request with everything not given looked up from the open position.
    #[must_use]
    pub fn new(symbol: Symbol, take_profit: Decimal, stop_loss: Decimal) -> Self {
        Self {
            symbol,
            take_profit,
            stop_loss,
            stop_limit: None,
            quantity: None,
            direction: None,
            entry_price: None,
            entry_order_id: None,
            time_in_force: TimeInForce::Gtc,
        }
    }

    /// Fix the protected quantity and direction instead of reading the position.
    #[must_use]
    pub const fn with_position(mut self, quantity: Decimal, direction: PositionDirection) -> Self {
        self.quantity = Some(quantity);
        self.direction = Some(direction);
        self
    }

    /// Set the entry price.
    #[must_use]
    pub const fn with_entry_price(mut self, price: Decimal) -> Self {
        self.entry_price = Some(price);
        self
    }

    /// Make the stop leg a stop-limit.
    #[must_use]
    pub const fn with_stop_limit(mut self, price: Decimal) -> Self {
        self.stop_limit = Some(price);
        self
    }

    /// Set the entry order id.
    #[must_use]
    pub fn with_entry_order_id(mut self, order_id: impl Into<OrderId>) -> Self {
        self.entry_order_id = Some(order_id.into());
        self
    }
}

/// Errors from bracket placement.
#[derive(Debug, Error)]
pub enum PlacementError {
    /// The requested levels or quantities are inconsistent.
    #[error(transparent)]
    InvalidBracket(#[from] BracketError),

    /// An order spec failed validation.
    #[error(transparent)]
    InvalidOrder(#[from] DomainError),

    /// No open position to derive quantity or direction from.
    #[error("no open position in {symbol}")]
    NoPosition {
        /// Instrument.
        symbol: String,
    },

    /// Position lookup failed.
    #[error("failed to read positions: {0}")]
    PositionLookup(#[source] GatewayError),

    /// The take-profit leg failed; nothing was left at the gateway.
    #[error("take-profit order failed: {0}")]
    TakeProfitFailed(#[source] GatewayError),

    /// The stop leg failed after the take-profit leg was acknowledged.
    /// The take-profit order is live and unprotected by a sibling.
    #[error("stop-loss order failed, take-profit order {orphan_order_id} left live: {source}")]
    StopLossFailed {
        /// Live take-profit order the caller must handle.
        orphan_order_id: OrderId,
        /// Gateway error for the stop leg.
        source: GatewayError,
    },
}

impl PlacementError {
    /// Order left live at the gateway without a sibling, if any.
    #[must_use]
    pub const fn orphan_order_id(&self) -> Option<&OrderId> {
        match self {
            Self::StopLossFailed {
                orphan_order_id, ..
            } => Some(orphan_order_id),
            _ => None,
        }
    }

    /// Whether a venue rejection (rather than a transport failure) caused it.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        match self {
            Self::TakeProfitFailed(e) | Self::StopLossFailed { source: e, .. } => e.is_rejection(),
            _ => false,
        }
    }
}

/// Use case placing both protective legs and building the bracket.
pub struct PlaceBracketUseCase<G: OrderGateway + ?Sized> {
    gateway: Arc<G>,
}

impl<G: OrderGateway + ?Sized> PlaceBracketUseCase<G> {
    /// Create a new `PlaceBracketUseCase`.
    #[must_use]
    pub const fn new(gateway: Arc<G>) -> Self {
        Self { gateway }
    }

    /// Place the take-profit leg, then the stop leg, then build the bracket.
    ///
    /// # Errors
    ///
    /// Returns `PlacementError` if the request is invalid, the position
    /// cannot be resolved, or either placement fails. When the stop leg fails
    /// the error carries the live take-profit order id.
    pub async fn execute(&self, request: PlaceBracketRequest) -> Result<Bracket, PlacementError> {
        request.symbol.validate()?;
        let (quantity, direction, entry_price) = self.resolve_position(&request).await?;

        if !direction.levels_ordered(request.take_profit, request.stop_loss) {
            return Err(BracketError::InvalidDefinition {
                message: format!(
                    "{direction} bracket has take-profit {} on the wrong side of stop {}",
                    request.take_profit, request.stop_loss
                ),
            }
            .into());
        }

        let exit_side = direction.exit_side();
        let take_profit_spec = OrderSpec::limit(
            request.symbol.clone(),
            exit_side,
            quantity,
            request.take_profit,
        )
        .with_time_in_force(request.time_in_force);
        let stop_spec = match request.stop_limit {
            Some(limit) => OrderSpec::stop_limit(
                request.symbol.clone(),
                exit_side,
                quantity,
                request.stop_loss,
                limit,
            ),
            None => OrderSpec::stop(request.symbol.clone(), exit_side, quantity, request.stop_loss),
        }
        .with_time_in_force(request.time_in_force);
        take_profit_spec.validate()?;
        stop_spec.validate()?;

        let take_profit = self
            .place(take_profit_spec)
            .await
            .map_err(PlacementError::TakeProfitFailed)?;
        tracing::info!(
            symbol = %request.symbol,
            order_id = %take_profit,
            price = %request.take_profit,
            "Take-profit order placed"
        );

        let stop = match self.place(stop_spec).await {
            Ok(order_id) => order_id,
            Err(source) => {
                tracing::error!(
                    symbol = %request.symbol,
                    orphan_order_id = %take_profit,
                    error = %source,
                    "Stop-loss order failed, take-profit left without sibling"
                );
                return Err(PlacementError::StopLossFailed {
                    orphan_order_id: take_profit,
                    source,
                });
            }
        };
        tracing::info!(
            symbol = %request.symbol,
            order_id = %stop,
            price = %request.stop_loss,
            "Stop-loss order placed"
        );

        let mut bracket = Bracket::new(
            BracketId::generate(),
            request.symbol,
            direction,
            quantity,
            BracketLeg::new(take_profit).at(request.take_profit),
            BracketLeg::new(stop).at(request.stop_loss),
        )?;
        if let Some(price) = entry_price {
            bracket = bracket.with_entry_price(price);
        }
        if let Some(order_id) = request.entry_order_id {
            bracket = bracket.with_entry_order_id(order_id);
        }
        Ok(bracket)
    }

    async fn resolve_position(
        &self,
        request: &PlaceBracketRequest,
    ) -> Result<(Decimal, PositionDirection, Option<Decimal>), PlacementError> {
        if let (Some(quantity), Some(direction)) = (request.quantity, request.direction)
            && request.entry_price.is_some()
        {
            return Ok((quantity, direction, request.entry_price));
        }

        let positions = self
            .gateway
            .list_positions()
            .await
            .map_err(PlacementError::PositionLookup)?;
        let position = positions
            .into_iter()
            .find(|p| p.symbol == request.symbol && p.net_quantity != Decimal::ZERO);

        match (position, request.quantity, request.direction) {
            (Some(position), quantity, direction) => {
                let held = if position.is_long() {
                    PositionDirection::Long
                } else {
                    PositionDirection::Short
                };
                Ok((
                    quantity.unwrap_or_else(|| position.net_quantity.abs()),
                    direction.unwrap_or(held),
                    request.entry_price.or(Some(position.avg_price)),
                ))
            }
            (None, Some(quantity), Some(direction)) => Ok((quantity, direction, request.entry_price)),
            (None, _, _) => Err(PlacementError::NoPosition {
                symbol: request.symbol.to_string(),
            }),
        }
    }

    async fn place(&self, spec: OrderSpec) -> Result<OrderId, GatewayError> {
        let kind = spec.kind.as_wire();
        match self.gateway.place_order(spec).await {
            Ok(ack) => {
                observability::record_order_placement(kind, "accepted");
                Ok(ack.order_id)
            }
            Err(error) => {
                let status = if error.is_rejection() { "rejected" } else { "error" };
                observability::record_order_placement(kind, status);
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{OrderKind, OrderSide, PositionSnapshot};
    use crate::infrastructure::broker::InMemoryOrderGateway;
    use rust_decimal_macros::dec;

    fn gateway_with_position(net_quantity: Decimal) -> Arc<InMemoryOrderGateway> {
        let gateway = InMemoryOrderGateway::new();
        gateway.add_position(PositionSnapshot {
            symbol: Symbol::new("SPY"),
            net_quantity,
            avg_price: dec!(500),
        });
        Arc::new(gateway)
    }

    #[tokio::test]
    async fn places_both_legs_from_position() {
        let gateway = gateway_with_position(dec!(10));
        let use_case = PlaceBracketUseCase::new(gateway.clone());

        let bracket = use_case
            .execute(PlaceBracketRequest::new(Symbol::new("SPY"), dec!(510), dec!(495)))
            .await
            .unwrap();

        assert_eq!(bracket.quantity(), dec!(10));
        assert_eq!(bracket.direction(), PositionDirection::Long);
        assert_eq!(bracket.entry_price(), Some(dec!(500)));

        let placed = gateway.placed_orders();
        assert_eq!(placed.len(), 2);
        assert_eq!(placed[0].kind, OrderKind::Limit);
        assert_eq!(placed[0].side, OrderSide::Sell);
        assert_eq!(placed[0].limit_price, Some(dec!(510)));
        assert_eq!(placed[1].kind, OrderKind::Stop);
        assert_eq!(placed[1].stop_price, Some(dec!(495)));
    }

    #[tokio::test]
    async fn short_position_buys_to_close() {
        let gateway = gateway_with_position(dec!(-4));
        let use_case = PlaceBracketUseCase::new(gateway.clone());

        let bracket = use_case
            .execute(
                PlaceBracketRequest::new(Symbol::new("SPY"), dec!(480), dec!(505))
                    .with_stop_limit(dec!(506)),
            )
            .await
            .unwrap();

        assert_eq!(bracket.direction(), PositionDirection::Short);
        assert_eq!(bracket.quantity(), dec!(4));
        let placed = gateway.placed_orders();
        assert!(placed.iter().all(|spec| spec.side == OrderSide::Buy));
        assert_eq!(placed[1].kind, OrderKind::StopLimit);
    }

    #[tokio::test]
    async fn stop_leg_failure_reports_orphan() {
        let gateway = gateway_with_position(dec!(10));
        let use_case = PlaceBracketUseCase::new(gateway.clone());
        gateway.fail_place_after(
            1,
            GatewayError::Rejected {
                reason: "insufficient qty available".to_string(),
            },
        );

        let err = use_case
            .execute(PlaceBracketRequest::new(Symbol::new("SPY"), dec!(510), dec!(495)))
            .await
            .unwrap_err();

        assert!(err.is_rejection());
        let orphan = err.orphan_order_id().cloned().unwrap();
        assert_eq!(gateway.placed_orders().len(), 1);
        assert!(gateway.order(&orphan).is_some());
    }

    #[tokio::test]
    async fn take_profit_failure_leaves_nothing() {
        let gateway = gateway_with_position(dec!(10));
        gateway.fail_place_after(0, GatewayError::request_failed("connection refused"));
        let use_case = PlaceBracketUseCase::new(gateway.clone());

        let err = use_case
            .execute(PlaceBracketRequest::new(Symbol::new("SPY"), dec!(510), dec!(495)))
            .await
            .unwrap_err();

        assert!(matches!(err, PlacementError::TakeProfitFailed(_)));
        assert!(err.orphan_order_id().is_none());
        assert!(gateway.placed_orders().is_empty());
    }

    #[tokio::test]
    async fn wrong_side_levels_place_nothing() {
        let gateway = gateway_with_position(dec!(10));
        let use_case = PlaceBracketUseCase::new(gateway.clone());

        let err = use_case
            .execute(PlaceBracketRequest::new(Symbol::new("SPY"), dec!(490), dec!(495)))
            .await
            .unwrap_err();

        assert!(matches!(err, PlacementError::InvalidBracket(_)));
        assert!(gateway.placed_orders().is_empty());
    }

    #[tokio::test]
    async fn missing_position_needs_explicit_quantity() {
        let gateway = Arc::new(InMemoryOrderGateway::new());
        let use_case = PlaceBracketUseCase::new(gateway.clone());

        let err = use_case
            .execute(PlaceBracketRequest::new(Symbol::new("QQQ"), dec!(510), dec!(495)))
            .await
            .unwrap_err();
        assert!(matches!(err, PlacementError::NoPosition { .. }));

        let bracket = use_case
            .execute(
                PlaceBracketRequest::new(Symbol::new("QQQ"), dec!(510), dec!(495))
                    .with_position(dec!(3), PositionDirection::Long),
            )
            .await
            .unwrap();
        assert_eq!(bracket.entry_price(), None);
    }
}
