//! Observability: Prometheus metrics for the monitor and gateway.

mod metrics;

pub use metrics::{
    MetricsConfig, MetricsError, init_metrics, record_cancel_attempt, record_cancel_failure,
    record_order_placement, record_tick, record_transition, set_active_brackets,
};
