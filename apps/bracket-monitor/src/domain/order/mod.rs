//! Order Bounded Context
//!
//! Read-only view of gateway orders and positions. The gateway owns order
//! state; the monitor only ever holds snapshots of it.

pub mod snapshot;
pub mod value_objects;

pub use snapshot::{OrderSnapshot, PositionSnapshot};
pub use value_objects::{OrderKind, OrderSide, OrderStatus, TimeInForce};
