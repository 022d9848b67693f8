//! Domain Layer
//!
//! The innermost layer containing business logic with zero infrastructure dependencies.
//!
//! - **Aggregates**: `Bracket`, the consistency boundary for one protected position
//! - **Value Objects**: identifiers, symbols, order side/kind/status
//! - **Domain Services**: the pure reconciliation policy
//!
//! # Bounded Contexts
//!
//! - [`order`]: read-only views of gateway orders and positions
//! - [`bracket`]: bracket lifecycle, reconciliation and cancellation guard

pub mod bracket;
pub mod order;
pub mod shared;
