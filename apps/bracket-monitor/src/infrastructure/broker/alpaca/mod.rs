//! Alpaca Markets order gateway.
//!
//! REST adapter for the Alpaca trading API with:
//! - API-key header authentication
//! - Transport retry for idempotent reads only
//! - Environment-aware safety logging (PAPER vs LIVE)

mod adapter;
mod api_types;
mod config;
mod error;
mod http_client;

pub use adapter::AlpacaOrderGateway;
pub use api_types::parse_order_status;
pub use config::{AlpacaConfig, AlpacaEnvironment};
pub use error::AlpacaError;
