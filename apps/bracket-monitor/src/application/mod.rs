//! Application Layer
//!
//! Orchestrates the domain through ports:
//!
//! - **Ports**: the order gateway contract
//! - **Services**: the polling monitor and its handle
//! - **Use Cases**: bracket placement

pub mod ports;
pub mod services;
pub mod use_cases;

pub use ports::*;
pub use services::*;
pub use use_cases::*;
