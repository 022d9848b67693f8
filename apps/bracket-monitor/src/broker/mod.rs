//! Retry policies shared by gateway adapters and the monitor.

mod retry;

pub use retry::{
    ExponentialBackoffCalculator, RetryPolicy, is_retryable_status, parse_retry_after,
};
