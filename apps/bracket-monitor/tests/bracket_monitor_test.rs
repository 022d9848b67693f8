//! End-to-end monitor behaviour against the scriptable in-memory gateway.
//!
//! Time is paused, so a 60 second polling interval costs nothing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bracket_monitor::application::services::MonitorSession;
use bracket_monitor::{
    Bracket, BracketId, BracketLeg, BracketMonitor, BracketState, GatewayError,
    InMemoryOrderGateway, MonitorOptions, OrderId, OrderKind, OrderSide, OrderSnapshot,
    OrderStatus, PlaceBracketRequest, PlaceBracketUseCase, PositionDirection, PositionSnapshot,
    ResolutionReason, SessionEnd, Symbol, start_bracket_monitor,
};
use parking_lot::Mutex;
use proptest::prelude::*;
use rust_decimal_macros::dec;
use tokio::time::Instant;

fn open_leg(id: &str, kind: OrderKind, price: rust_decimal::Decimal) -> OrderSnapshot {
    let snapshot = OrderSnapshot::new(
        OrderId::new(id),
        Symbol::new("AAPL"),
        OrderSide::Sell,
        kind,
        dec!(10),
        OrderStatus::Open,
    );
    match kind {
        OrderKind::Limit => snapshot.with_limit_price(price),
        _ => snapshot.with_stop_price(price),
    }
}

/// Gateway holding `{prefix}-tp` at 510 and `{prefix}-sl` at 495 for each prefix.
fn gateway_with(prefixes: &[&str]) -> Arc<InMemoryOrderGateway> {
    let gateway = InMemoryOrderGateway::new();
    for prefix in prefixes {
        gateway.insert_order(open_leg(&format!("{prefix}-tp"), OrderKind::Limit, dec!(510)));
        gateway.insert_order(open_leg(&format!("{prefix}-sl"), OrderKind::Stop, dec!(495)));
    }
    Arc::new(gateway)
}

fn bracket(prefix: &str) -> Bracket {
    Bracket::new(
        BracketId::new(prefix),
        Symbol::new("AAPL"),
        PositionDirection::Long,
        dec!(10),
        BracketLeg::new(format!("{prefix}-tp")).at(dec!(510)),
        BracketLeg::new(format!("{prefix}-sl")).at(dec!(495)),
    )
    .unwrap()
    .with_entry_price(dec!(500))
}

fn options(max_ticks: u64) -> MonitorOptions {
    MonitorOptions::default()
        .with_interval(Duration::from_secs(60))
        .with_max_ticks(max_ticks)
}

fn tp(prefix: &str) -> OrderId {
    OrderId::new(format!("{prefix}-tp"))
}

fn sl(prefix: &str) -> OrderId {
    OrderId::new(format!("{prefix}-sl"))
}

#[tokio::test(start_paused = true)]
async fn take_profit_fill_on_second_tick_cancels_stop() {
    let gateway = gateway_with(&["b1"]);
    gateway.schedule_status(&tp("b1"), 2, OrderStatus::Filled, Some(dec!(510)));

    let handle = start_bracket_monitor(gateway.clone(), bracket("b1"), options(360)).unwrap();
    let summary = handle.wait().await.unwrap();

    assert_eq!(summary.end, SessionEnd::AllResolved);
    assert_eq!(summary.ticks, 2);
    assert_eq!(gateway.cancel_calls(), vec![sl("b1")]);

    let report = &summary.resolved[0];
    assert_eq!(report.state, BracketState::ResolvedProfit);
    assert_eq!(report.reason, ResolutionReason::ProtectiveFilled);
    assert_eq!(report.cancelled_order_id, Some(sl("b1")));
    assert!(!report.cancellation_failed);
    assert_eq!(report.cancel_attempts, 1);
    assert_eq!(report.ticks, 2);

    let outcome = report.outcome.unwrap();
    assert_eq!(outcome.exit_price, dec!(510));
    assert_eq!(outcome.pnl, dec!(100));
    assert_eq!(
        gateway.order(&sl("b1")).map(|o| o.status),
        Some(OrderStatus::Cancelled)
    );
}

#[tokio::test(start_paused = true)]
async fn failing_cleanup_cancel_still_resolves_loss() {
    let gateway = gateway_with(&["b1"]);
    gateway.schedule_status(&sl("b1"), 1, OrderStatus::Filled, Some(dec!(494.50)));
    gateway.fail_next_cancel(GatewayError::request_failed("503 Service Unavailable"));
    gateway.fail_next_cancel(GatewayError::request_failed("503 Service Unavailable"));

    let handle = start_bracket_monitor(gateway.clone(), bracket("b1"), options(360)).unwrap();
    let summary = handle.wait().await.unwrap();

    let report = &summary.resolved[0];
    assert_eq!(report.state, BracketState::ResolvedLoss);
    assert!(report.cancellation_failed);
    assert_eq!(report.cancel_attempts, 2);
    assert!(report.cancellation_error.as_deref().unwrap().contains("503"));
    assert_eq!(gateway.cancel_calls(), vec![tp("b1"), tp("b1")]);
    assert_eq!(report.outcome.unwrap().pnl, dec!(-55));
    assert!(summary.any_cancellation_failed());

    // The take-profit is still resting at the gateway.
    assert_eq!(
        gateway.order(&tp("b1")).map(|o| o.status),
        Some(OrderStatus::Open)
    );
}

#[tokio::test(start_paused = true)]
async fn dual_fill_resolves_unknown_without_cancels() {
    let gateway = gateway_with(&["b1"]);
    gateway.schedule_status(&tp("b1"), 1, OrderStatus::Filled, Some(dec!(510)));
    gateway.schedule_status(&sl("b1"), 1, OrderStatus::Filled, Some(dec!(495)));

    let handle = start_bracket_monitor(gateway.clone(), bracket("b1"), options(360)).unwrap();
    let summary = handle.wait().await.unwrap();

    let report = &summary.resolved[0];
    assert_eq!(report.state, BracketState::ResolvedUnknown);
    assert_eq!(report.reason, ResolutionReason::BothFilled);
    assert!(report.outcome.is_none());
    assert!(!report.cancellation_failed);
    assert!(gateway.cancel_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn fetch_failure_defers_resolution_to_next_tick() {
    let gateway = gateway_with(&["b1"]);
    gateway.schedule_status(&tp("b1"), 1, OrderStatus::Filled, Some(dec!(510)));
    gateway.fail_next_fetch(GatewayError::Timeout {
        operation: "list_orders".to_string(),
    });

    let handle = start_bracket_monitor(gateway.clone(), bracket("b1"), options(360)).unwrap();
    let summary = handle.wait().await.unwrap();

    assert_eq!(gateway.fetch_count(), 2);
    assert_eq!(summary.resolved[0].ticks, 2);
    assert_eq!(summary.resolved[0].state, BracketState::ResolvedProfit);
    assert_eq!(gateway.cancel_calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn each_bracket_reported_exactly_once() {
    let gateway = gateway_with(&["b1", "b2"]);
    gateway.schedule_status(&tp("b1"), 1, OrderStatus::Filled, Some(dec!(510)));
    // A late fill on an already resolved bracket must not be actioned.
    gateway.schedule_status(&sl("b1"), 2, OrderStatus::Filled, Some(dec!(495)));

    let monitor = BracketMonitor::new(gateway.clone(), options(3));
    let handle = monitor.start(vec![bracket("b1"), bracket("b2")]).unwrap();

    let seen: Arc<Mutex<HashMap<String, usize>>> = Arc::default();
    let sink = Arc::clone(&seen);
    handle.on_resolved(move |report| {
        *sink.lock().entry(report.bracket_id.to_string()).or_default() += 1;
    });

    let summary = handle.wait().await.unwrap();

    assert_eq!(summary.ticks, 3);
    assert_eq!(summary.end, SessionEnd::AllResolved);
    let seen = seen.lock();
    assert_eq!(seen.get("b1"), Some(&1));
    assert_eq!(seen.get("b2"), Some(&1));

    let states: Vec<_> = summary.resolved.iter().map(|r| (r.bracket_id.to_string(), r.state)).collect();
    assert_eq!(
        states,
        vec![
            ("b1".to_string(), BracketState::ResolvedProfit),
            ("b2".to_string(), BracketState::Expired),
        ]
    );
    assert_eq!(gateway.cancel_calls(), vec![sl("b1")]);
}

#[tokio::test(start_paused = true)]
async fn stop_leaves_orders_and_reports_untouched() {
    let gateway = gateway_with(&["b1"]);
    let handle = start_bracket_monitor(gateway.clone(), bracket("b1"), options(360)).unwrap();

    tokio::time::sleep(Duration::from_secs(150)).await;
    handle.stop();
    let resolved_before_stop = handle.resolved();
    let summary = handle.wait().await.unwrap();

    assert!(resolved_before_stop.is_empty());
    assert_eq!(summary.end, SessionEnd::Stopped);
    assert_eq!(summary.ticks, 2);
    assert_eq!(summary.unresolved, vec![BracketId::new("b1")]);
    assert!(summary.resolved.is_empty());
    assert!(gateway.cancel_calls().is_empty());
    assert_eq!(
        gateway.order(&tp("b1")).map(|o| o.status),
        Some(OrderStatus::Open)
    );
}

#[tokio::test(start_paused = true)]
async fn stop_during_inflight_fetch_sends_no_cancel() {
    let gateway = gateway_with(&["b1"]);
    gateway.schedule_status(&tp("b1"), 1, OrderStatus::Filled, Some(dec!(510)));
    gateway.set_latency(Some(Duration::from_secs(20)));

    let handle = start_bracket_monitor(gateway.clone(), bracket("b1"), options(360)).unwrap();

    // First fetch starts at 60s and would return at 80s.
    tokio::time::sleep(Duration::from_secs(65)).await;
    handle.stop();
    let stopped_at = Instant::now();
    let summary = handle.wait().await.unwrap();

    assert!(stopped_at.elapsed() < Duration::from_secs(1));
    assert_eq!(summary.end, SessionEnd::Stopped);
    assert!(summary.resolved.is_empty());
    assert_eq!(summary.unresolved, vec![BracketId::new("b1")]);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(gateway.cancel_calls().is_empty());
    assert_eq!(
        gateway.order(&sl("b1")).map(|o| o.status),
        Some(OrderStatus::Open)
    );
}

#[tokio::test(start_paused = true)]
async fn hung_cancels_do_not_stretch_a_tick() {
    let prefixes = ["b1", "b2", "b3"];
    let gateway = gateway_with(&prefixes);
    for prefix in prefixes {
        gateway.schedule_status(&tp(prefix), 1, OrderStatus::Filled, Some(dec!(510)));
    }
    gateway.set_cancel_latency(Some(Duration::from_secs(100_000)));

    let started = Instant::now();
    let handle = BracketMonitor::new(gateway.clone(), options(360))
        .start(prefixes.iter().map(|p| bracket(p)).collect())
        .unwrap();
    let summary = handle.wait().await.unwrap();

    // First tick fires at 60s and must finish within one more interval.
    assert!(started.elapsed() <= Duration::from_secs(120));
    assert_eq!(summary.ticks, 1);
    assert_eq!(summary.resolved.len(), 3);
    for report in &summary.resolved {
        assert_eq!(report.state, BracketState::ResolvedProfit);
        assert!(report.cancellation_failed);
        assert!(report.cancellation_error.is_some());
    }
}

#[tokio::test(start_paused = true)]
async fn placed_bracket_is_monitored_to_profit() {
    let gateway = Arc::new(InMemoryOrderGateway::new());
    gateway.add_position(PositionSnapshot {
        symbol: Symbol::new("AAPL"),
        net_quantity: dec!(10),
        avg_price: dec!(500),
    });

    let request = PlaceBracketRequest::new(Symbol::new("AAPL"), dec!(510), dec!(495));
    let bracket = PlaceBracketUseCase::new(gateway.clone())
        .execute(request)
        .await
        .unwrap();
    assert_eq!(bracket.entry_price(), Some(dec!(500)));
    assert_eq!(bracket.direction(), PositionDirection::Long);

    let placed = gateway.placed_orders();
    assert_eq!(placed.len(), 2);
    assert!(placed.iter().all(|spec| spec.side == OrderSide::Sell));

    gateway.schedule_status(bracket.protective_order_id(), 3, OrderStatus::Filled, Some(dec!(510.40)));
    let stop_id = bracket.stop_order_id().clone();

    let handle = start_bracket_monitor(gateway.clone(), bracket, options(360)).unwrap();
    let summary = handle.wait().await.unwrap();

    let report = &summary.resolved[0];
    assert_eq!(report.state, BracketState::ResolvedProfit);
    assert_eq!(report.outcome.unwrap().pnl, dec!(104.0));
    assert_eq!(gateway.cancel_calls(), vec![stop_id]);
}

#[derive(Debug, Clone, Copy)]
enum Observed {
    Open,
    Filled,
    Cancelled,
    Missing,
}

fn observed() -> impl Strategy<Value = Observed> {
    prop_oneof![
        3 => Just(Observed::Open),
        1 => Just(Observed::Filled),
        1 => Just(Observed::Cancelled),
        1 => Just(Observed::Missing),
    ]
}

fn apply(gateway: &InMemoryOrderGateway, id: &OrderId, observed: Observed) {
    match observed {
        Observed::Open => gateway.set_status(id, OrderStatus::Open),
        Observed::Filled => gateway.set_status(id, OrderStatus::Filled),
        Observed::Cancelled => gateway.set_status(id, OrderStatus::Cancelled),
        Observed::Missing => gateway.hide_order(id),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn cancels_target_one_sibling_and_terminal_states_stick(
        script in prop::collection::vec((observed(), observed(), any::<bool>()), 1..8),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();

        runtime.block_on(async {
            let gateway = gateway_with(&["b1"]);
            let options = MonitorOptions::default()
                .with_interval(Duration::from_secs(1))
                .with_max_ticks(script.len() as u64);
            let mut session = MonitorSession::new(gateway.clone(), vec![bracket("b1")], options).unwrap();
            let mut resolved = Vec::new();

            for (protective, stop, fetch_fails) in &script {
                apply(&gateway, &tp("b1"), *protective);
                apply(&gateway, &sl("b1"), *stop);
                if *fetch_fails {
                    gateway.fail_next_fetch(GatewayError::request_failed("flaky"));
                }
                let report = session.tick().await;
                resolved.extend(report.resolved);
            }

            let calls = gateway.cancel_calls();
            prop_assert!(calls.len() <= 2);
            prop_assert!(calls.windows(2).all(|w| w[0] == w[1]));
            prop_assert_eq!(resolved.len(), 1);
            prop_assert!(resolved[0].state.is_terminal());
            prop_assert!(session.is_finished());
            Ok(())
        })?;
    }
}
