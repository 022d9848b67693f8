//! Application Ports
//!
//! Driven ports define how the application reaches external systems.

mod order_gateway_port;

pub use order_gateway_port::{GatewayError, OrderAck, OrderGateway, OrderSpec};
