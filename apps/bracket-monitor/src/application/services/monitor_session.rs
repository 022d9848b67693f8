//! Monitor Session
//!
//! Owns the set of watched brackets and runs one tick at a time: a single
//! `list_orders` call, then sequential evaluation of every active bracket
//! against that snapshot. Brackets leave the session as soon as they reach a
//! terminal state.
//!
//! The session is driven by exactly one task, so bracket state is only ever
//! mutated from inside [`MonitorSession::tick`].
//!
//! A tick never outlasts the polling interval. The fetch and every sibling
//! cancel in the tick share one deadline; each call is further bounded by
//! the request timeout. A cancel that the deadline cuts short is recorded as
//! a cancellation failure and the bracket still resolves.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{MonitorError, MonitorOptions};
use crate::application::ports::{GatewayError, OrderGateway};
use crate::broker::{ExponentialBackoffCalculator, RetryPolicy};
use crate::domain::bracket::{
    Bracket, BracketState, MAX_CANCEL_ATTEMPTS, OutcomeEstimate, ReconciliationAction,
    ResolutionReason, ResolutionReport, TransitionRecord, resolve,
};
use crate::domain::order::{OrderSnapshot, OrderStatus};
use crate::domain::shared::{BracketId, OrderId};
use crate::observability;

/// What happened during one tick.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// Tick number, starting at 1.
    pub tick: u64,
    /// Set when the order fetch failed or timed out; no bracket moved.
    pub fetch_error: Option<GatewayError>,
    /// Every state change, in order.
    pub transitions: Vec<TransitionRecord>,
    /// Brackets that reached a terminal state this tick.
    pub resolved: Vec<ResolutionReport>,
}

/// Active brackets plus the tick counter.
pub struct MonitorSession<G: OrderGateway + ?Sized> {
    gateway: Arc<G>,
    brackets: Vec<Bracket>,
    options: MonitorOptions,
    tick: u64,
    shutdown: CancellationToken,
}

impl<G: OrderGateway + ?Sized> MonitorSession<G> {
    /// Create a session.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError` if the options or the bracket set are invalid.
    pub fn new(
        gateway: Arc<G>,
        brackets: Vec<Bracket>,
        options: MonitorOptions,
    ) -> Result<Self, MonitorError> {
        options.validate_session(&brackets)?;
        observability::set_active_brackets(brackets.len());
        Ok(Self {
            gateway,
            brackets,
            options,
            tick: 0,
            shutdown: CancellationToken::new(),
        })
    }

    /// Stop evaluating brackets once `token` is cancelled. A tick that sees
    /// the token after its fetch discards the snapshot and issues no cancel.
    #[must_use]
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Whether the session has been told to stop.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Ticks executed so far.
    #[must_use]
    pub const fn ticks(&self) -> u64 {
        self.tick
    }

    /// Brackets still being watched.
    #[must_use]
    pub fn brackets(&self) -> &[Bracket] {
        &self.brackets
    }

    /// Ids of brackets still being watched.
    #[must_use]
    pub fn unresolved_ids(&self) -> Vec<BracketId> {
        self.brackets.iter().map(|b| b.id().clone()).collect()
    }

    /// Session options.
    #[must_use]
    pub const fn options(&self) -> &MonitorOptions {
        &self.options
    }

    /// True once every bracket has resolved or expired.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.brackets.is_empty()
    }

    /// Run one tick.
    ///
    /// Never fails: a fetch error or timeout is reported in the returned
    /// [`TickReport`] and leaves every bracket untouched, except that the
    /// final tick still expires whatever is left.
    pub async fn tick(&mut self) -> TickReport {
        self.tick += 1;
        let tick = self.tick;
        let started = Instant::now();
        let budget = CallBudget {
            tick_deadline: started + self.options.interval,
            request_timeout: self.options.effective_request_timeout(),
        };
        let mut report = TickReport {
            tick,
            ..TickReport::default()
        };

        let fetched = budget.run(
            "list_orders",
            call_with_retry(&RetryPolicy::fetch(), || self.gateway.list_orders()),
        )
        .await;
        let latency = started.elapsed().as_secs_f64();

        match fetched {
            Ok(orders) => {
                observability::record_tick("ok", latency);
                tracing::debug!(tick, orders = orders.len(), "Fetched order snapshot");
                let snapshot: HashMap<OrderId, OrderSnapshot> = orders
                    .into_iter()
                    .map(|order| (order.order_id.clone(), order))
                    .collect();
                for bracket in &mut self.brackets {
                    if self.shutdown.is_cancelled() {
                        tracing::info!(tick, "Monitor stopped, skipping evaluation");
                        break;
                    }
                    evaluate(
                        self.gateway.as_ref(),
                        &self.options,
                        &budget,
                        bracket,
                        &snapshot,
                        tick,
                        &mut report,
                    )
                    .await;
                }
            }
            Err(error) => {
                let outcome = if matches!(error, GatewayError::Timeout { .. }) {
                    "timeout"
                } else {
                    "fetch_failed"
                };
                observability::record_tick(outcome, latency);
                tracing::warn!(
                    tick,
                    error = %error,
                    "Order fetch failed, skipping tick"
                );
                report.fetch_error = Some(error);
            }
        }

        if tick >= self.options.max_ticks && !self.shutdown.is_cancelled() {
            for bracket in &mut self.brackets {
                if bracket.state().is_active() {
                    expire(bracket, tick, &mut report);
                }
            }
        }

        self.brackets.retain(|b| !b.state().is_terminal());
        observability::set_active_brackets(self.brackets.len());
        report
    }
}

async fn evaluate<G: OrderGateway + ?Sized>(
    gateway: &G,
    options: &MonitorOptions,
    budget: &CallBudget,
    bracket: &mut Bracket,
    snapshot: &HashMap<OrderId, OrderSnapshot>,
    tick: u64,
    report: &mut TickReport,
) {
    let protective = snapshot.get(bracket.protective_order_id());
    let stop = snapshot.get(bracket.stop_order_id());
    let protective_status = protective.map_or(OrderStatus::Unknown, |o| o.status);
    let stop_status = stop.map_or(OrderStatus::Unknown, |o| o.status);

    let resolution = resolve(bracket.state(), protective_status, stop_status);
    let Some(reason) = resolution.reason else {
        tracing::trace!(
            tick,
            bracket_id = %bracket.id(),
            protective = %protective_status,
            stop = %stop_status,
            "Bracket unchanged"
        );
        return;
    };

    let from = bracket.state();
    let target = match resolution.action {
        ReconciliationAction::CancelStop => Some(bracket.stop_order_id().clone()),
        ReconciliationAction::CancelProtective => Some(bracket.protective_order_id().clone()),
        ReconciliationAction::None | ReconciliationAction::FlagBothFilled => None,
    };

    if let Some(target) = target {
        if let Err(error) = bracket.transition_to(BracketState::Resolving) {
            tracing::error!(bracket_id = %bracket.id(), error = %error, "Cannot begin resolution");
            return;
        }
        push_transition(bracket, from, BracketState::Resolving, reason, None, report);
        cancel_sibling(gateway, options, budget, bracket, &target).await;
    }

    let before = bracket.state();
    if let Err(error) = bracket.transition_to(resolution.new_state) {
        tracing::error!(bracket_id = %bracket.id(), error = %error, "Cannot resolve bracket");
        return;
    }

    let filled = match resolution.new_state {
        BracketState::ResolvedProfit => protective.map(|o| (o, bracket.protective().price)),
        BracketState::ResolvedLoss => stop.map(|o| (o, bracket.stop().price)),
        _ => None,
    };
    let outcome = filled.and_then(|(order, resting)| estimate(bracket, order, resting));

    push_transition(bracket, before, resolution.new_state, reason, outcome, report);
    finish(bracket, reason, outcome, tick, report);
}

fn estimate(
    bracket: &Bracket,
    order: &OrderSnapshot,
    resting: Option<Decimal>,
) -> Option<OutcomeEstimate> {
    let entry = bracket.entry_price()?;
    let exit = order.effective_price().or(resting)?;
    Some(OutcomeEstimate::compute(
        bracket.direction(),
        entry,
        exit,
        bracket.quantity(),
    ))
}

fn expire(bracket: &mut Bracket, tick: u64, report: &mut TickReport) {
    let from = bracket.state();
    if let Err(error) = bracket.transition_to(BracketState::Expired) {
        tracing::error!(bracket_id = %bracket.id(), error = %error, "Cannot expire bracket");
        return;
    }
    push_transition(
        bracket,
        from,
        BracketState::Expired,
        ResolutionReason::SessionExpired,
        None,
        report,
    );
    finish(bracket, ResolutionReason::SessionExpired, None, tick, report);
}

/// Cancel the live sibling under the bracket's guard.
///
/// At most two calls: the first, and one retry if the first failed with a
/// retryable error. Neither call nor backoff may run past the tick deadline.
/// Failure is recorded on the guard, never returned.
async fn cancel_sibling<G: OrderGateway + ?Sized>(
    gateway: &G,
    options: &MonitorOptions,
    budget: &CallBudget,
    bracket: &mut Bracket,
    target: &OrderId,
) {
    let policy = options.cancel_retry.clone().capped(MAX_CANCEL_ATTEMPTS);
    let mut backoff = ExponentialBackoffCalculator::new(&policy);
    let mut attempts_allowed = policy.max_attempts;

    if budget.is_spent() {
        bracket
            .cancellation_mut()
            .abandon(target, "tick deadline passed before cancel could be sent");
        tracing::warn!(
            bracket_id = %bracket.id(),
            order_id = %target,
            "No time left in tick, sibling cancel not sent"
        );
    }

    while attempts_allowed > 0 && bracket.cancellation_mut().acquire(target) {
        attempts_allowed -= 1;
        let attempt = bracket.cancellation().attempts();
        match budget.run("cancel_order", gateway.cancel_order(target)).await {
            Ok(()) => {
                observability::record_cancel_attempt("ok");
                bracket.cancellation_mut().record_success();
                tracing::info!(
                    bracket_id = %bracket.id(),
                    order_id = %target,
                    attempt,
                    "Sibling order cancelled"
                );
                break;
            }
            Err(error) => {
                observability::record_cancel_attempt("error");
                bracket.cancellation_mut().record_failure(error.to_string());
                tracing::warn!(
                    bracket_id = %bracket.id(),
                    order_id = %target,
                    attempt,
                    retryable = error.is_retryable(),
                    error = %error,
                    "Sibling cancel failed"
                );
                if !error.is_retryable() || attempts_allowed == 0 {
                    break;
                }
                match backoff.next_backoff() {
                    Some(delay) if budget.allows(delay) => tokio::time::sleep(delay).await,
                    Some(_) => {
                        tracing::warn!(
                            bracket_id = %bracket.id(),
                            order_id = %target,
                            "No time left in tick for a cancel retry"
                        );
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    bracket.cancellation_mut().seal();
    if bracket.cancellation().failed() {
        observability::record_cancel_failure();
    }
}

fn push_transition(
    bracket: &Bracket,
    from: BracketState,
    to: BracketState,
    reason: ResolutionReason,
    outcome: Option<OutcomeEstimate>,
    report: &mut TickReport,
) {
    let record = TransitionRecord {
        at: Utc::now(),
        bracket_id: bracket.id().clone(),
        from,
        to,
        reason,
        outcome,
    };
    log_transition(&record);
    observability::record_transition(&to.to_string());
    report.transitions.push(record);
}

fn log_transition(record: &TransitionRecord) {
    let pnl = record.outcome.map(|o| o.pnl.to_string());
    let exit_price = record.outcome.map(|o| o.exit_price.to_string());
    if record.reason.is_warning() {
        tracing::warn!(
            at = %record.at,
            bracket_id = %record.bracket_id,
            from = %record.from,
            to = %record.to,
            reason = %record.reason,
            "Bracket transition"
        );
    } else {
        tracing::info!(
            at = %record.at,
            bracket_id = %record.bracket_id,
            from = %record.from,
            to = %record.to,
            reason = %record.reason,
            exit_price = exit_price.as_deref(),
            pnl = pnl.as_deref(),
            "Bracket transition"
        );
    }
}

fn finish(
    bracket: &Bracket,
    reason: ResolutionReason,
    outcome: Option<OutcomeEstimate>,
    tick: u64,
    report: &mut TickReport,
) {
    let resolution = ResolutionReport::from_bracket(bracket, reason, outcome, tick);
    if resolution.cancellation_failed {
        tracing::warn!(
            bracket_id = %resolution.bracket_id,
            order_id = ?resolution.cancelled_order_id.as_ref().map(OrderId::as_str),
            attempts = resolution.cancel_attempts,
            error = resolution.cancellation_error.as_deref(),
            "Bracket resolved but sibling order may still be live"
        );
    }
    report.resolved.push(resolution);
}

/// Time limits for the gateway calls of one tick.
struct CallBudget {
    tick_deadline: Instant,
    request_timeout: Duration,
}

impl CallBudget {
    fn is_spent(&self) -> bool {
        Instant::now() >= self.tick_deadline
    }

    /// Whether sleeping `delay` still leaves time before the tick deadline.
    fn allows(&self, delay: Duration) -> bool {
        Instant::now() + delay < self.tick_deadline
    }

    fn deadline(&self) -> Instant {
        (Instant::now() + self.request_timeout).min(self.tick_deadline)
    }

    async fn run<T>(
        &self,
        operation: &str,
        call: impl Future<Output = Result<T, GatewayError>>,
    ) -> Result<T, GatewayError> {
        tokio::time::timeout_at(self.deadline(), call)
            .await
            .unwrap_or_else(|_| {
                Err(GatewayError::Timeout {
                    operation: operation.to_string(),
                })
            })
    }
}

/// Run `call` under `policy`, retrying only retryable errors.
async fn call_with_retry<T, F, Fut>(policy: &RetryPolicy, mut call: F) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let mut backoff = ExponentialBackoffCalculator::new(policy);
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_retryable() => match backoff.next_backoff() {
                Some(delay) => tokio::time::sleep(delay).await,
                None => return Err(error),
            },
            Err(error) => return Err(error),
        }
    }
}
