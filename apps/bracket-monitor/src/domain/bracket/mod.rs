//! Bracket Bounded Context
//!
//! A bracket pairs a take-profit ("protective") order with a stop-loss order
//! guarding one position. This context owns:
//!
//! - [`Bracket`]: the aggregate and its resolution state machine
//! - [`resolve`]: the pure reconciliation policy evaluated on every tick
//! - [`CancellationGuard`]: at-most-once sibling cancellation
//! - [`OutcomeEstimate`]: profit/loss estimate for display
//! - [`TransitionRecord`] / [`ResolutionReport`]: what callers observe

mod aggregate;
mod cancellation;
mod errors;
mod events;
mod outcome;
mod reconciliation;

pub use aggregate::{Bracket, BracketLeg, BracketState, PositionDirection};
pub use cancellation::{CancellationGuard, MAX_CANCEL_ATTEMPTS};
pub use errors::BracketError;
pub use events::{ResolutionReason, ResolutionReport, TransitionRecord};
pub use outcome::OutcomeEstimate;
pub use reconciliation::{ReconciliationAction, Resolution, resolve};
