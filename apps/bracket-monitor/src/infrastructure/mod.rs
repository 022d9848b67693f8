//! Infrastructure Layer
//!
//! Driven adapters implementing the ports defined in the application layer.
//!
//! - `broker/`: order gateway adapters (Alpaca, in-memory)

pub mod broker;
