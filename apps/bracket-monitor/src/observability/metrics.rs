//! Prometheus metrics for the bracket monitor.
//!
//! Recording functions go through the `metrics` facade and are no-ops until
//! [`init_metrics`] installs the exporter.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::{Ipv4Addr, SocketAddr};

/// Configuration for the metrics exporter.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Address to bind the metrics HTTP listener.
    pub listen_addr: SocketAddr,
    /// Histogram buckets for gateway latency (seconds).
    pub latency_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self::with_port(9090)
    }
}

impl MetricsConfig {
    /// Listen on all interfaces at `port`.
    #[must_use]
    pub fn with_port(port: u16) -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)),
            latency_buckets: vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        }
    }
}

/// Install the Prometheus exporter and its `/metrics` HTTP listener.
///
/// # Errors
///
/// Returns an error if the exporter cannot be configured or installed
/// (e.g. port already in use).
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    PrometheusBuilder::new()
        .with_http_listener(config.listen_addr)
        .set_buckets(&config.latency_buckets)
        .map_err(|e| MetricsError::Configuration(e.to_string()))?
        .install()
        .map_err(|e| MetricsError::Installation(e.to_string()))?;

    tracing::info!(
        addr = %config.listen_addr,
        "Prometheus metrics exporter started"
    );

    Ok(())
}

/// Error type for metrics operations.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Failed to configure metrics exporter.
    #[error("metrics configuration error: {0}")]
    Configuration(String),
    /// Failed to install metrics exporter.
    #[error("metrics installation error: {0}")]
    Installation(String),
}

/// Record one monitor tick.
///
/// * `outcome` - `"ok"`, `"fetch_failed"` or `"timeout"`
/// * `latency_seconds` - order list round-trip
pub fn record_tick(outcome: &'static str, latency_seconds: f64) {
    counter!("bracket_monitor_ticks_total", "outcome" => outcome).increment(1);
    histogram!("bracket_monitor_fetch_latency_seconds").record(latency_seconds);
}

/// Record a bracket state transition.
pub fn record_transition(state: &str) {
    counter!(
        "bracket_transitions_total",
        "state" => state.to_string()
    )
    .increment(1);
}

/// Record one sibling cancel call.
///
/// * `result` - `"ok"` or `"error"`
pub fn record_cancel_attempt(result: &'static str) {
    counter!("bracket_cancel_attempts_total", "result" => result).increment(1);
}

/// Record a bracket that resolved with its sibling cancel unacknowledged.
pub fn record_cancel_failure() {
    counter!("bracket_cancel_failures_total").increment(1);
}

/// Update the number of brackets still being watched.
pub fn set_active_brackets(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("bracket_monitor_active_brackets").set(count as f64);
}

/// Record an order placement.
///
/// * `kind` - `"limit"`, `"stop"`, ...
/// * `status` - `"accepted"`, `"rejected"` or `"error"`
pub fn record_order_placement(kind: &'static str, status: &'static str) {
    counter!(
        "order_placements_total",
        "kind" => kind,
        "status" => status
    )
    .increment(1);
}
