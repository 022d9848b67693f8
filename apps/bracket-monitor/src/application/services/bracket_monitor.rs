//! Bracket Monitor
//!
//! Spawns a [`MonitorSession`] on its own task, driven by a fixed-interval
//! ticker, and hands the caller a [`MonitorHandle`]. Stopping the handle
//! halts the ticker and leaves every order at the gateway untouched.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::{MonitorError, MonitorOptions, MonitorSession};
use crate::application::ports::OrderGateway;
use crate::domain::bracket::{Bracket, ResolutionReport};
use crate::domain::shared::BracketId;

/// Callback invoked once per resolved bracket.
pub type ResolutionCallback = Arc<dyn Fn(&ResolutionReport) + Send + Sync>;

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionEnd {
    /// Every bracket resolved or expired.
    AllResolved,
    /// [`MonitorHandle::stop`] was called first.
    Stopped,
}

/// Final account of a monitor session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    /// How the session ended.
    pub end: SessionEnd,
    /// Reports in resolution order.
    pub resolved: Vec<ResolutionReport>,
    /// Brackets still active when the session was stopped.
    pub unresolved: Vec<BracketId>,
    /// Ticks executed.
    pub ticks: u64,
}

impl SessionSummary {
    /// Whether any bracket resolved with an unacknowledged sibling cancel.
    #[must_use]
    pub fn any_cancellation_failed(&self) -> bool {
        self.resolved.iter().any(|r| r.cancellation_failed)
    }
}

/// Reports produced so far plus the subscribers to notify.
///
/// Registration and publication each take the lock once, so a subscriber
/// sees every report exactly once whichever comes first.
#[derive(Default)]
struct ResolutionLedger {
    reports: Vec<ResolutionReport>,
    callbacks: Vec<ResolutionCallback>,
}

fn publish(ledger: &Mutex<ResolutionLedger>, report: &ResolutionReport) {
    let callbacks = {
        let mut guard = ledger.lock();
        guard.reports.push(report.clone());
        guard.callbacks.clone()
    };
    for callback in callbacks {
        if catch_unwind(AssertUnwindSafe(|| callback(report))).is_err() {
            tracing::error!(
                bracket_id = %report.bracket_id,
                "Resolution callback panicked, continuing session"
            );
        }
    }
}

/// Handle to a running monitor.
pub struct MonitorHandle {
    shutdown: CancellationToken,
    running: Arc<AtomicBool>,
    ledger: Arc<Mutex<ResolutionLedger>>,
    task: JoinHandle<SessionSummary>,
}

impl MonitorHandle {
    /// Halt polling. Orders at the gateway are not touched and brackets that
    /// have not resolved produce no report.
    pub fn stop(&self) {
        if !self.shutdown.is_cancelled() {
            tracing::info!("Stopping bracket monitor");
        }
        self.shutdown.cancel();
    }

    /// Register a callback invoked once per resolved bracket.
    ///
    /// Reports produced before registration are replayed immediately.
    pub fn on_resolved<F>(&self, callback: F)
    where
        F: Fn(&ResolutionReport) + Send + Sync + 'static,
    {
        let callback: ResolutionCallback = Arc::new(callback);
        let replay = {
            let mut guard = self.ledger.lock();
            guard.callbacks.push(Arc::clone(&callback));
            guard.reports.clone()
        };
        for report in &replay {
            callback(report);
        }
    }

    /// Reports produced so far.
    #[must_use]
    pub fn resolved(&self) -> Vec<ResolutionReport> {
        self.ledger.lock().reports.clone()
    }

    /// Whether the session task is still polling.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// A token that stops this monitor when cancelled.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Wait for the session to end.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::TaskFailed` if the session task panicked.
    pub async fn wait(self) -> Result<SessionSummary, MonitorError> {
        self.task.await.map_err(|e| MonitorError::TaskFailed {
            message: e.to_string(),
        })
    }
}

/// Starts monitor sessions against one gateway.
pub struct BracketMonitor<G: OrderGateway + ?Sized> {
    gateway: Arc<G>,
    options: MonitorOptions,
}

impl<G: OrderGateway + ?Sized + 'static> BracketMonitor<G> {
    /// Create a monitor.
    #[must_use]
    pub const fn new(gateway: Arc<G>, options: MonitorOptions) -> Self {
        Self { gateway, options }
    }

    /// Monitor options.
    #[must_use]
    pub const fn options(&self) -> &MonitorOptions {
        &self.options
    }

    /// Start watching `brackets` on a new task.
    ///
    /// Must be called from inside a Tokio runtime. The first tick fires one
    /// interval after the call.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError` if the options or the bracket set are invalid.
    pub fn start(&self, brackets: Vec<Bracket>) -> Result<MonitorHandle, MonitorError> {
        let shutdown = CancellationToken::new();
        let session = MonitorSession::new(
            Arc::clone(&self.gateway),
            brackets,
            self.options.clone(),
        )?
        .with_shutdown(shutdown.clone());
        let running = Arc::new(AtomicBool::new(true));
        let ledger = Arc::new(Mutex::new(ResolutionLedger::default()));

        tracing::info!(
            brackets = session.brackets().len(),
            interval_ms = u64::try_from(self.options.interval.as_millis()).unwrap_or(u64::MAX),
            max_ticks = self.options.max_ticks,
            "Starting bracket monitor"
        );

        let task = tokio::spawn(run_session(
            session,
            shutdown.clone(),
            Arc::clone(&running),
            Arc::clone(&ledger),
        ));

        Ok(MonitorHandle {
            shutdown,
            running,
            ledger,
            task,
        })
    }
}

/// Start watching a single bracket.
///
/// # Errors
///
/// Returns `MonitorError` if the options are invalid or the bracket is not
/// active.
pub fn start_bracket_monitor<G: OrderGateway + ?Sized + 'static>(
    gateway: Arc<G>,
    bracket: Bracket,
    options: MonitorOptions,
) -> Result<MonitorHandle, MonitorError> {
    BracketMonitor::new(gateway, options).start(vec![bracket])
}

async fn run_session<G: OrderGateway + ?Sized>(
    mut session: MonitorSession<G>,
    shutdown: CancellationToken,
    running: Arc<AtomicBool>,
    ledger: Arc<Mutex<ResolutionLedger>>,
) -> SessionSummary {
    let interval = session.options().interval;
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let end = loop {
        let due = tokio::select! {
            biased;
            () = shutdown.cancelled() => false,
            _ = ticker.tick() => true,
        };
        if !due {
            log_stopped(&session);
            break SessionEnd::Stopped;
        }

        // An in-flight tick is abandoned on stop, so no cancel goes out after it.
        let report = tokio::select! {
            biased;
            () = shutdown.cancelled() => None,
            report = session.tick() => Some(report),
        };
        let Some(report) = report else {
            log_stopped(&session);
            break SessionEnd::Stopped;
        };

        for resolved in &report.resolved {
            publish(&ledger, resolved);
        }
        if session.is_finished() {
            tracing::info!(ticks = session.ticks(), "All brackets resolved");
            break SessionEnd::AllResolved;
        }
    };

    running.store(false, Ordering::SeqCst);
    let resolved = ledger.lock().reports.clone();
    SessionSummary {
        end,
        resolved,
        unresolved: session.unresolved_ids(),
        ticks: session.ticks(),
    }
}

fn log_stopped<G: OrderGateway + ?Sized>(session: &MonitorSession<G>) {
    tracing::info!(
        ticks = session.ticks(),
        unresolved = session.brackets().len(),
        "Bracket monitor stopped, orders left untouched"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use crate::domain::bracket::{BracketLeg, BracketState, PositionDirection};
    use crate::domain::shared::Symbol;
    use crate::infrastructure::broker::InMemoryOrderGateway;
    use rust_decimal_macros::dec;

    fn bracket(id: &str) -> Bracket {
        Bracket::new(
            BracketId::new(id),
            Symbol::new("SPY"),
            PositionDirection::Long,
            dec!(1),
            BracketLeg::new(format!("{id}-tp")),
            BracketLeg::new(format!("{id}-sl")),
        )
        .unwrap()
    }

    fn options(max_ticks: u64) -> MonitorOptions {
        MonitorOptions::default()
            .with_interval(Duration::from_secs(60))
            .with_max_ticks(max_ticks)
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_fires_on_resolved_once() {
        let gateway = Arc::new(InMemoryOrderGateway::new());
        let handle = start_bracket_monitor(gateway.clone(), bracket("b-1"), options(3)).unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        handle.on_resolved(move |report| {
            assert_eq!(report.state, BracketState::Expired);
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let summary = handle.wait().await.unwrap();
        assert_eq!(summary.end, SessionEnd::AllResolved);
        assert_eq!(summary.ticks, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.fetch_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn late_subscriber_gets_replay() {
        let gateway = Arc::new(InMemoryOrderGateway::new());
        let handle = start_bracket_monitor(gateway, bracket("b-1"), options(1)).unwrap();

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(handle.resolved().len(), 1);
        assert!(!handle.is_running());

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        handle.on_resolved(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_leaves_orders_untouched() {
        let gateway = Arc::new(InMemoryOrderGateway::new());
        let handle = BracketMonitor::new(gateway.clone(), options(100))
            .start(vec![bracket("b-1"), bracket("b-2")])
            .unwrap();

        tokio::time::sleep(Duration::from_secs(150)).await;
        handle.stop();
        let summary = handle.wait().await.unwrap();

        assert_eq!(summary.end, SessionEnd::Stopped);
        assert_eq!(summary.ticks, 2);
        assert!(summary.resolved.is_empty());
        assert_eq!(summary.unresolved.len(), 2);
        assert!(gateway.cancel_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_before_first_tick() {
        let gateway = Arc::new(InMemoryOrderGateway::new());
        let handle = start_bracket_monitor(gateway.clone(), bracket("b-1"), options(5)).unwrap();
        handle.stop();
        let summary = handle.wait().await.unwrap();
        assert_eq!(summary.end, SessionEnd::Stopped);
        assert_eq!(summary.ticks, 0);
        assert_eq!(gateway.fetch_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_callback_does_not_lose_reports() {
        let gateway = Arc::new(InMemoryOrderGateway::new());
        let handle = BracketMonitor::new(gateway, options(1))
            .start(vec![bracket("b-1"), bracket("b-2")])
            .unwrap();

        handle.on_resolved(|_| panic!("subscriber bug"));
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        handle.on_resolved(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let summary = handle.wait().await.unwrap();
        assert_eq!(summary.end, SessionEnd::AllResolved);
        assert_eq!(summary.resolved.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalid_options_fail_synchronously() {
        let gateway = Arc::new(InMemoryOrderGateway::new());
        let result = start_bracket_monitor(
            gateway,
            bracket("b-1"),
            MonitorOptions::default().with_interval(Duration::ZERO),
        );
        assert!(matches!(result, Err(MonitorError::ZeroInterval)));
    }
}
