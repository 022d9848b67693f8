//! Order Value Objects
//!
//! Immutable types describing gateway orders.

mod order_kind;
mod order_side;
mod order_status;
mod time_in_force;

pub use order_kind::OrderKind;
pub use order_side::OrderSide;
pub use order_status::OrderStatus;
pub use time_in_force::TimeInForce;
