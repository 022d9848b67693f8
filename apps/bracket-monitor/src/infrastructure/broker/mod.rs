//! Order Gateway Adapters
//!
//! Implementations of `OrderGateway`: the Alpaca REST adapter and an
//! in-memory gateway for tests and simulation.

pub mod alpaca;
pub mod in_memory;

pub use alpaca::{AlpacaConfig, AlpacaEnvironment, AlpacaError, AlpacaOrderGateway};
pub use in_memory::InMemoryOrderGateway;
