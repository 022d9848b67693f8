//! Bracket Aggregate
//!
//! Holds the two sibling order ids, the price levels they rest at and the
//! resolution state. All state changes go through [`Bracket::transition_to`],
//! which refuses to leave a terminal state.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{BracketError, CancellationGuard};
use crate::domain::order::OrderSide;
use crate::domain::shared::{BracketId, OrderId, Symbol};

/// Direction of the position a bracket protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionDirection {
    /// Long position (bought to open).
    Long,
    /// Short position (sold to open).
    Short,
}

impl PositionDirection {
    /// Side of the orders that close a position in this direction.
    #[must_use]
    pub const fn exit_side(&self) -> OrderSide {
        match self {
            Self::Long => OrderSide::Sell,
            Self::Short => OrderSide::Buy,
        }
    }

    /// Whether a take-profit at `take_profit` and a stop at `stop` sit on the
    /// correct sides of each other for this direction.
    #[must_use]
    pub fn levels_ordered(&self, take_profit: Decimal, stop: Decimal) -> bool {
        match self {
            Self::Long => take_profit > stop,
            Self::Short => take_profit < stop,
        }
    }
}

impl From<OrderSide> for PositionDirection {
    fn from(side: OrderSide) -> Self {
        match side {
            OrderSide::Buy => Self::Long,
            OrderSide::Sell => Self::Short,
        }
    }
}

impl fmt::Display for PositionDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => write!(f, "long"),
            Self::Short => write!(f, "short"),
        }
    }
}

/// Resolution state of a bracket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BracketState {
    /// Both legs are being watched.
    Active,
    /// A fill was observed and the sibling cancel is in flight.
    Resolving,
    /// Take-profit filled.
    ResolvedProfit,
    /// Stop-loss filled.
    ResolvedLoss,
    /// Both legs filled, or both ended without a fill.
    ResolvedUnknown,
    /// Session ran out of ticks while the bracket was still active.
    Expired,
}

impl BracketState {
    /// Returns true if no further transition can occur.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ResolvedProfit | Self::ResolvedLoss | Self::ResolvedUnknown | Self::Expired
        )
    }

    /// Returns true while the bracket is still watched.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Whether `self -> next` is an allowed edge.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        match self {
            Self::Active => !matches!(next, Self::Active),
            Self::Resolving => matches!(next, Self::ResolvedProfit | Self::ResolvedLoss),
            _ => false,
        }
    }
}

impl fmt::Display for BracketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Resolving => write!(f, "RESOLVING"),
            Self::ResolvedProfit => write!(f, "RESOLVED_PROFIT"),
            Self::ResolvedLoss => write!(f, "RESOLVED_LOSS"),
            Self::ResolvedUnknown => write!(f, "RESOLVED_UNKNOWN"),
            Self::Expired => write!(f, "EXPIRED"),
        }
    }
}

/// One side of a bracket: the gateway order and the price it rests at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BracketLeg {
    /// Gateway order id.
    pub order_id: OrderId,
    /// Limit price (take-profit) or trigger price (stop), when known.
    pub price: Option<Decimal>,
}

impl BracketLeg {
    /// A leg whose resting price is not known.
    #[must_use]
    pub fn new(order_id: impl Into<OrderId>) -> Self {
        Self {
            order_id: order_id.into(),
            price: None,
        }
    }

    /// Set the resting price.
    #[must_use]
    pub const fn at(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }
}

/// Take-profit and stop-loss orders jointly protecting one position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bracket {
    id: BracketId,
    symbol: Symbol,
    direction: PositionDirection,
    quantity: Decimal,
    entry_order_id: Option<OrderId>,
    entry_price: Option<Decimal>,
    protective: BracketLeg,
    stop: BracketLeg,
    state: BracketState,
    created_at: DateTime<Utc>,
    cancellation: CancellationGuard,
}

impl Bracket {
    /// Create an active bracket.
    ///
    /// # Errors
    ///
    /// Returns `BracketError` if an id is blank, both legs share an order id,
    /// the quantity is not positive, the symbol is malformed, or the price
    /// levels sit on the wrong side of each other for the direction.
    pub fn new(
        id: BracketId,
        symbol: Symbol,
        direction: PositionDirection,
        quantity: Decimal,
        protective: BracketLeg,
        stop: BracketLeg,
    ) -> Result<Self, BracketError> {
        if id.is_blank() {
            return Err(BracketError::invalid("bracket id cannot be empty"));
        }
        symbol.validate()?;
        if protective.order_id.is_blank() {
            return Err(BracketError::invalid("protective order id cannot be empty"));
        }
        if stop.order_id.is_blank() {
            return Err(BracketError::invalid("stop order id cannot be empty"));
        }
        if protective.order_id == stop.order_id {
            return Err(BracketError::invalid(format!(
                "protective and stop legs share order id {}",
                stop.order_id
            )));
        }
        if quantity <= Decimal::ZERO {
            return Err(BracketError::invalid(format!(
                "quantity must be positive, got {quantity}"
            )));
        }
        if let (Some(take_profit), Some(stop_price)) = (protective.price, stop.price) {
            if take_profit <= Decimal::ZERO || stop_price <= Decimal::ZERO {
                return Err(BracketError::invalid("prices must be positive"));
            }
            if !direction.levels_ordered(take_profit, stop_price) {
                return Err(BracketError::invalid(format!(
                    "{direction} bracket has take-profit {take_profit} on the wrong side of stop {stop_price}"
                )));
            }
        }

        Ok(Self {
            id,
            symbol,
            direction,
            quantity,
            entry_order_id: None,
            entry_price: None,
            protective,
            stop,
            state: BracketState::Active,
            created_at: Utc::now(),
            cancellation: CancellationGuard::default(),
        })
    }

    /// Attach the order that opened the position.
    #[must_use]
    pub fn with_entry_order_id(mut self, order_id: impl Into<OrderId>) -> Self {
        self.entry_order_id = Some(order_id.into());
        self
    }

    /// Attach the entry price used for the outcome estimate.
    #[must_use]
    pub const fn with_entry_price(mut self, price: Decimal) -> Self {
        self.entry_price = Some(price);
        self
    }

    /// Bracket id.
    #[must_use]
    pub const fn id(&self) -> &BracketId {
        &self.id
    }

    /// Instrument.
    #[must_use]
    pub const fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Direction of the protected position.
    #[must_use]
    pub const fn direction(&self) -> PositionDirection {
        self.direction
    }

    /// Protected quantity.
    #[must_use]
    pub const fn quantity(&self) -> Decimal {
        self.quantity
    }

    /// Entry order id, if known.
    #[must_use]
    pub const fn entry_order_id(&self) -> Option<&OrderId> {
        self.entry_order_id.as_ref()
    }

    /// Entry price, if known.
    #[must_use]
    pub const fn entry_price(&self) -> Option<Decimal> {
        self.entry_price
    }

    /// Take-profit leg.
    #[must_use]
    pub const fn protective(&self) -> &BracketLeg {
        &self.protective
    }

    /// Stop-loss leg.
    #[must_use]
    pub const fn stop(&self) -> &BracketLeg {
        &self.stop
    }

    /// Take-profit order id.
    #[must_use]
    pub const fn protective_order_id(&self) -> &OrderId {
        &self.protective.order_id
    }

    /// Stop-loss order id.
    #[must_use]
    pub const fn stop_order_id(&self) -> &OrderId {
        &self.stop.order_id
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> BracketState {
        self.state
    }

    /// Creation time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Cancellation guard.
    #[must_use]
    pub const fn cancellation(&self) -> &CancellationGuard {
        &self.cancellation
    }

    /// Mutable cancellation guard.
    pub fn cancellation_mut(&mut self) -> &mut CancellationGuard {
        &mut self.cancellation
    }

    /// Move to `next`, returning the previous state.
    ///
    /// # Errors
    ///
    /// Returns `BracketError::InvalidTransition` for any edge not in the
    /// state machine, including every edge out of a terminal state.
    pub fn transition_to(&mut self, next: BracketState) -> Result<BracketState, BracketError> {
        if !self.state.can_transition_to(next) {
            return Err(BracketError::InvalidTransition {
                bracket_id: self.id.to_string(),
                from: self.state,
                to: next,
            });
        }
        let previous = self.state;
        self.state = next;
        if next.is_terminal() {
            self.cancellation.seal();
        }
        Ok(previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn long_bracket() -> Bracket {
        Bracket::new(
            BracketId::new("b-1"),
            Symbol::new("SPY"),
            PositionDirection::Long,
            dec!(10),
            BracketLeg::new("tp-1").at(dec!(510)),
            BracketLeg::new("sl-1").at(dec!(495)),
        )
        .unwrap()
    }

    #[test]
    fn new_bracket_is_active() {
        let bracket = long_bracket().with_entry_price(dec!(500));
        assert_eq!(bracket.state(), BracketState::Active);
        assert_eq!(bracket.protective_order_id().as_str(), "tp-1");
        assert_eq!(bracket.stop_order_id().as_str(), "sl-1");
        assert_eq!(bracket.entry_price(), Some(dec!(500)));
        assert!(!bracket.cancellation().is_attempted());
    }

    #[test]
    fn rejects_shared_order_id() {
        let err = Bracket::new(
            BracketId::new("b-1"),
            Symbol::new("SPY"),
            PositionDirection::Long,
            dec!(10),
            BracketLeg::new("same"),
            BracketLeg::new("same"),
        )
        .unwrap_err();
        assert!(matches!(err, BracketError::InvalidDefinition { .. }));
    }

    #[test]
    fn rejects_blank_ids_and_bad_quantity() {
        let build = |id: &str, tp: &str, sl: &str, qty: Decimal| {
            Bracket::new(
                BracketId::new(id),
                Symbol::new("SPY"),
                PositionDirection::Long,
                qty,
                BracketLeg::new(tp),
                BracketLeg::new(sl),
            )
        };
        assert!(build(" ", "tp", "sl", dec!(1)).is_err());
        assert!(build("b", "", "sl", dec!(1)).is_err());
        assert!(build("b", "tp", "", dec!(1)).is_err());
        assert!(build("b", "tp", "sl", dec!(0)).is_err());
        assert!(build("b", "tp", "sl", dec!(-3)).is_err());
        assert!(build("b", "tp", "sl", dec!(1)).is_ok());
    }

    #[test]
    fn rejects_wrong_side_prices() {
        let long = Bracket::new(
            BracketId::new("b-1"),
            Symbol::new("SPY"),
            PositionDirection::Long,
            dec!(1),
            BracketLeg::new("tp").at(dec!(490)),
            BracketLeg::new("sl").at(dec!(495)),
        );
        assert!(long.is_err());

        let short = Bracket::new(
            BracketId::new("b-2"),
            Symbol::new("SPY"),
            PositionDirection::Short,
            dec!(1),
            BracketLeg::new("tp").at(dec!(490)),
            BracketLeg::new("sl").at(dec!(505)),
        );
        assert!(short.is_ok());
    }

    #[test]
    fn rejects_invalid_symbol() {
        let err = Bracket::new(
            BracketId::new("b-1"),
            Symbol::new("SP Y"),
            PositionDirection::Long,
            dec!(1),
            BracketLeg::new("tp"),
            BracketLeg::new("sl"),
        )
        .unwrap_err();
        assert!(matches!(err, BracketError::Domain(_)));
    }

    #[test]
    fn resolving_then_resolved() {
        let mut bracket = long_bracket();
        assert_eq!(
            bracket.transition_to(BracketState::Resolving).unwrap(),
            BracketState::Active
        );
        assert!(bracket.transition_to(BracketState::Expired).is_err());
        bracket.transition_to(BracketState::ResolvedProfit).unwrap();
        assert!(bracket.state().is_terminal());
    }

    #[test]
    fn terminal_states_are_final() {
        for terminal in [
            BracketState::ResolvedProfit,
            BracketState::ResolvedLoss,
            BracketState::ResolvedUnknown,
            BracketState::Expired,
        ] {
            let mut bracket = long_bracket();
            bracket.transition_to(terminal).unwrap();
            for next in [
                BracketState::Active,
                BracketState::Resolving,
                BracketState::ResolvedProfit,
                BracketState::ResolvedLoss,
                BracketState::ResolvedUnknown,
                BracketState::Expired,
            ] {
                assert!(bracket.transition_to(next).is_err());
                assert_eq!(bracket.state(), terminal);
            }
        }
    }

    #[test]
    fn terminal_transition_seals_guard() {
        let mut bracket = long_bracket();
        bracket.transition_to(BracketState::Expired).unwrap();
        assert!(!bracket.cancellation_mut().acquire(&OrderId::new("sl-1")));
    }

    #[test]
    fn direction_exit_side() {
        assert_eq!(PositionDirection::Long.exit_side(), OrderSide::Sell);
        assert_eq!(PositionDirection::Short.exit_side(), OrderSide::Buy);
        assert_eq!(PositionDirection::from(OrderSide::Buy), PositionDirection::Long);
    }
}
