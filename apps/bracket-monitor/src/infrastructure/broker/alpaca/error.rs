//! Alpaca-specific error types.

use thiserror::Error;

use crate::application::ports::GatewayError;

/// Errors from the Alpaca adapter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AlpacaError {
    /// API key or secret missing from configuration.
    #[error("Alpaca credentials are not configured")]
    MissingCredentials,

    /// Credentials refused (401, or 403 outside order placement).
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Connection-level failure.
    #[error("Network error: {0}")]
    Network(String),

    /// Request exceeded the client timeout.
    #[error("Request timed out")]
    Timeout,

    /// 5xx or 408 response.
    #[error("Server error {status}: {message}")]
    Server {
        /// HTTP status.
        status: u16,
        /// Error message from the API.
        message: String,
    },

    /// Throttled (429).
    #[error("Rate limited{}", retry_after_secs.map(|s| format!(", retry after {s}s")).unwrap_or_default())]
    RateLimited {
        /// Suggested retry delay in seconds.
        retry_after_secs: Option<u64>,
    },

    /// Venue refused the order (422, or 403 on placement).
    #[error("Order rejected: {0}")]
    OrderRejected(String),

    /// Resource does not exist (404).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other non-success response.
    #[error("API error: {code} - {message}")]
    Api {
        /// Error code from the API.
        code: String,
        /// Error message from the API.
        message: String,
    },

    /// Response body could not be decoded.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<AlpacaError> for GatewayError {
    fn from(err: AlpacaError) -> Self {
        match err {
            AlpacaError::MissingCredentials => Self::Unauthorized {
                message: "credentials are not configured".to_string(),
            },
            AlpacaError::AuthenticationFailed(message) => Self::Unauthorized { message },
            AlpacaError::Network(message) => Self::RequestFailed { message },
            AlpacaError::Timeout => Self::Timeout {
                operation: "alpaca request".to_string(),
            },
            AlpacaError::Server { status, message } => Self::RequestFailed {
                message: format!("{status}: {message}"),
            },
            AlpacaError::RateLimited { .. } => Self::RateLimited,
            AlpacaError::OrderRejected(reason) => Self::Rejected { reason },
            AlpacaError::NotFound(order_id) => Self::NotFound { order_id },
            AlpacaError::Api { code, message } => Self::Rejected {
                reason: format!("{code}: {message}"),
            },
            AlpacaError::InvalidResponse(message) => Self::RequestFailed { message },
        }
    }
}
