//! Bracket Errors

use thiserror::Error;

use super::BracketState;
use crate::domain::shared::DomainError;

/// Errors raised by the bracket aggregate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BracketError {
    /// The bracket definition is malformed.
    #[error("Invalid bracket: {message}")]
    InvalidDefinition {
        /// Error details.
        message: String,
    },

    /// The requested state transition is not allowed.
    #[error("Invalid transition for bracket {bracket_id}: {from} -> {to}")]
    InvalidTransition {
        /// Bracket id.
        bracket_id: String,
        /// Current state.
        from: BracketState,
        /// Requested state.
        to: BracketState,
    },

    /// Underlying value object validation failed.
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl BracketError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            message: message.into(),
        }
    }
}
