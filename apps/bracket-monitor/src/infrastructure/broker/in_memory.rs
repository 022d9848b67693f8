//! In-memory order gateway.
//!
//! Scriptable stand-in for a brokerage used by the test-suite and by the
//! binary's `--simulate` mode. Every call is recorded; fetch, cancel and
//! place failures can be queued, status changes can be scheduled against the
//! fetch counter, and an artificial latency can be applied to every call.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::application::ports::{GatewayError, OrderAck, OrderGateway, OrderSpec};
use crate::domain::order::{OrderSnapshot, OrderStatus, PositionSnapshot};
use crate::domain::shared::OrderId;

#[derive(Debug, Clone)]
struct ScheduledStatus {
    order_id: OrderId,
    on_fetch: u64,
    status: OrderStatus,
    filled_price: Option<Decimal>,
}

#[derive(Debug, Default)]
struct GatewayState {
    orders: Vec<OrderSnapshot>,
    hidden: HashSet<OrderId>,
    positions: Vec<PositionSnapshot>,
    placed: Vec<OrderSpec>,
    cancel_calls: Vec<OrderId>,
    fetch_count: u64,
    next_id: u64,
    schedule: Vec<ScheduledStatus>,
    fetch_failures: VecDeque<GatewayError>,
    cancel_failures: VecDeque<GatewayError>,
    place_failure: Option<(usize, GatewayError)>,
    latency: Option<Duration>,
    cancel_latency: Option<Duration>,
}

impl GatewayState {
    fn order_mut(&mut self, order_id: &OrderId) -> Option<&mut OrderSnapshot> {
        self.orders.iter_mut().find(|o| &o.order_id == order_id)
    }

    fn apply_schedule(&mut self) {
        let due: Vec<ScheduledStatus> = self
            .schedule
            .iter()
            .filter(|s| s.on_fetch <= self.fetch_count)
            .cloned()
            .collect();
        self.schedule.retain(|s| s.on_fetch > self.fetch_count);
        for change in due {
            if let Some(order) = self.order_mut(&change.order_id) {
                order.status = change.status;
                if change.filled_price.is_some() {
                    order.filled_price = change.filled_price;
                }
            }
        }
    }
}

/// Scriptable in-memory implementation of `OrderGateway`.
#[derive(Debug, Default)]
pub struct InMemoryOrderGateway {
    state: Mutex<GatewayState>,
}

impl InMemoryOrderGateway {
    /// Create an empty gateway.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an order.
    pub fn insert_order(&self, order: OrderSnapshot) {
        let mut state = self.state.lock();
        state.orders.retain(|o| o.order_id != order.order_id);
        state.orders.push(order);
    }

    /// Add an open position.
    pub fn add_position(&self, position: PositionSnapshot) {
        self.state.lock().positions.push(position);
    }

    /// Current view of one order, hidden or not.
    #[must_use]
    pub fn order(&self, order_id: &OrderId) -> Option<OrderSnapshot> {
        self.state
            .lock()
            .orders
            .iter()
            .find(|o| &o.order_id == order_id)
            .cloned()
    }

    /// Set an order's status.
    pub fn set_status(&self, order_id: &OrderId, status: OrderStatus) {
        if let Some(order) = self.state.lock().order_mut(order_id) {
            order.status = status;
        }
    }

    /// Mark an order filled at `price`.
    pub fn fill(&self, order_id: &OrderId, price: Decimal) {
        if let Some(order) = self.state.lock().order_mut(order_id) {
            order.status = OrderStatus::Filled;
            order.filled_price = Some(price);
        }
    }

    /// Change an order's status once `list_orders` has been called `on_fetch` times.
    pub fn schedule_status(
        &self,
        order_id: &OrderId,
        on_fetch: u64,
        status: OrderStatus,
        filled_price: Option<Decimal>,
    ) {
        self.state.lock().schedule.push(ScheduledStatus {
            order_id: order_id.clone(),
            on_fetch,
            status,
            filled_price,
        });
    }

    /// Leave an order out of `list_orders`, as if purged from the order book.
    pub fn hide_order(&self, order_id: &OrderId) {
        self.state.lock().hidden.insert(order_id.clone());
    }

    /// Fail the next `list_orders` call with `error`.
    pub fn fail_next_fetch(&self, error: GatewayError) {
        self.state.lock().fetch_failures.push_back(error);
    }

    /// Fail the next `cancel_order` call with `error`. Queue several to fail
    /// several calls.
    pub fn fail_next_cancel(&self, error: GatewayError) {
        self.state.lock().cancel_failures.push_back(error);
    }

    /// Let `successes` placements through, then fail the next one with `error`.
    pub fn fail_place_after(&self, successes: usize, error: GatewayError) {
        self.state.lock().place_failure = Some((successes, error));
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.state.lock().latency = latency;
    }

    /// Delay `cancel_order` only, overriding `set_latency` for cancels.
    pub fn set_cancel_latency(&self, latency: Option<Duration>) {
        self.state.lock().cancel_latency = latency;
    }

    /// Order ids passed to `cancel_order`, in call order, failed calls included.
    #[must_use]
    pub fn cancel_calls(&self) -> Vec<OrderId> {
        self.state.lock().cancel_calls.clone()
    }

    /// Number of `list_orders` calls, failed calls included.
    #[must_use]
    pub fn fetch_count(&self) -> u64 {
        self.state.lock().fetch_count
    }

    /// Specs of acknowledged placements.
    #[must_use]
    pub fn placed_orders(&self) -> Vec<OrderSpec> {
        self.state.lock().placed.clone()
    }

    async fn delay(&self) {
        let latency = self.state.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    async fn cancel_delay(&self) {
        let latency = {
            let state = self.state.lock();
            state.cancel_latency.or(state.latency)
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl OrderGateway for InMemoryOrderGateway {
    async fn place_order(&self, spec: OrderSpec) -> Result<OrderAck, GatewayError> {
        self.delay().await;
        let mut state = self.state.lock();

        let fail_now = match state.place_failure.as_mut() {
            Some((0, _)) => true,
            Some((successes, _)) => {
                *successes -= 1;
                false
            }
            None => false,
        };
        if fail_now && let Some((_, error)) = state.place_failure.take() {
            return Err(error);
        }

        state.next_id += 1;
        let order_id = OrderId::new(format!("sim-{}", state.next_id));
        let mut snapshot = OrderSnapshot::new(
            order_id.clone(),
            spec.symbol.clone(),
            spec.side,
            spec.kind,
            spec.quantity,
            OrderStatus::Open,
        );
        snapshot.limit_price = spec.limit_price;
        snapshot.stop_price = spec.stop_price;
        state.orders.push(snapshot);
        state.placed.push(spec);

        Ok(OrderAck {
            order_id,
            status: OrderStatus::Open,
        })
    }

    async fn cancel_order(&self, order_id: &OrderId) -> Result<(), GatewayError> {
        self.cancel_delay().await;
        let mut state = self.state.lock();
        state.cancel_calls.push(order_id.clone());

        if let Some(error) = state.cancel_failures.pop_front() {
            return Err(error);
        }

        let Some(order) = state.order_mut(order_id) else {
            return Err(GatewayError::NotFound {
                order_id: order_id.to_string(),
            });
        };
        if order.status.is_terminal() {
            return Err(GatewayError::Rejected {
                reason: format!("order is {} and not cancelable", order.status),
            });
        }
        order.status = OrderStatus::Cancelled;
        order.observed_at = Utc::now();
        Ok(())
    }

    async fn list_orders(&self) -> Result<Vec<OrderSnapshot>, GatewayError> {
        self.delay().await;
        let mut state = self.state.lock();
        state.fetch_count += 1;
        state.apply_schedule();

        if let Some(error) = state.fetch_failures.pop_front() {
            return Err(error);
        }

        let now = Utc::now();
        Ok(state
            .orders
            .iter()
            .filter(|o| !state.hidden.contains(&o.order_id))
            .cloned()
            .map(|mut o| {
                o.observed_at = now;
                o
            })
            .collect())
    }

    async fn list_positions(&self) -> Result<Vec<PositionSnapshot>, GatewayError> {
        self.delay().await;
        Ok(self.state.lock().positions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{OrderKind, OrderSide};
    use crate::domain::shared::Symbol;
    use rust_decimal_macros::dec;

    fn spec() -> OrderSpec {
        OrderSpec::limit(Symbol::new("SPY"), OrderSide::Sell, dec!(10), dec!(510))
    }

    #[tokio::test]
    async fn place_then_list() {
        let gateway = InMemoryOrderGateway::new();
        let ack = gateway.place_order(spec()).await.unwrap();
        assert_eq!(ack.order_id.as_str(), "sim-1");

        let orders = gateway.list_orders().await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].kind, OrderKind::Limit);
        assert_eq!(orders[0].status, OrderStatus::Open);
        assert_eq!(orders[0].limit_price, Some(dec!(510)));
    }

    #[tokio::test]
    async fn cancel_marks_cancelled_and_is_recorded() {
        let gateway = InMemoryOrderGateway::new();
        let ack = gateway.place_order(spec()).await.unwrap();

        gateway.cancel_order(&ack.order_id).await.unwrap();
        assert_eq!(
            gateway.order(&ack.order_id).map(|o| o.status),
            Some(OrderStatus::Cancelled)
        );

        let again = gateway.cancel_order(&ack.order_id).await;
        assert!(matches!(again, Err(GatewayError::Rejected { .. })));
        assert_eq!(gateway.cancel_calls().len(), 2);
    }

    #[tokio::test]
    async fn cancel_unknown_order() {
        let gateway = InMemoryOrderGateway::new();
        let result = gateway.cancel_order(&OrderId::new("nope")).await;
        assert!(matches!(result, Err(GatewayError::NotFound { .. })));
    }

    #[tokio::test]
    async fn scripted_failures_are_consumed_in_order() {
        let gateway = InMemoryOrderGateway::new();
        gateway.fail_next_fetch(GatewayError::request_failed("reset"));
        assert!(gateway.list_orders().await.is_err());
        assert!(gateway.list_orders().await.is_ok());
        assert_eq!(gateway.fetch_count(), 2);
    }

    #[tokio::test]
    async fn schedule_applies_on_fetch() {
        let gateway = InMemoryOrderGateway::new();
        let ack = gateway.place_order(spec()).await.unwrap();
        gateway.schedule_status(&ack.order_id, 2, OrderStatus::Filled, Some(dec!(510.1)));

        let first = gateway.list_orders().await.unwrap();
        assert_eq!(first[0].status, OrderStatus::Open);
        let second = gateway.list_orders().await.unwrap();
        assert_eq!(second[0].status, OrderStatus::Filled);
        assert_eq!(second[0].filled_price, Some(dec!(510.1)));
    }

    #[tokio::test]
    async fn hidden_orders_are_omitted() {
        let gateway = InMemoryOrderGateway::new();
        let ack = gateway.place_order(spec()).await.unwrap();
        gateway.hide_order(&ack.order_id);
        assert!(gateway.list_orders().await.unwrap().is_empty());
        assert!(gateway.order(&ack.order_id).is_some());
    }

    #[tokio::test]
    async fn place_failure_after_successes() {
        let gateway = InMemoryOrderGateway::new();
        gateway.fail_place_after(1, GatewayError::request_failed("503"));
        assert!(gateway.place_order(spec()).await.is_ok());
        assert!(gateway.place_order(spec()).await.is_err());
        assert!(gateway.place_order(spec()).await.is_ok());
        assert_eq!(gateway.placed_orders().len(), 2);
    }
}
