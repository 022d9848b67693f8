//! Domain errors shared by every bounded context.

use thiserror::Error;

/// Domain-level errors that can occur in business logic.
///
/// These errors are independent of infrastructure concerns.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// Invalid value for a field.
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue {
        /// Field name.
        field: String,
        /// Error message.
        message: String,
    },

    /// Aggregate invariant violated.
    #[error("Invariant violation in {aggregate}: {invariant}")]
    InvariantViolation {
        /// Aggregate type.
        aggregate: String,
        /// Invariant that was violated.
        invariant: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_value_display() {
        let err = DomainError::InvalidValue {
            field: "quantity".to_string(),
            message: "must be positive".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid value for 'quantity': must be positive"
        );
    }

    #[test]
    fn invariant_violation_display() {
        let err = DomainError::InvariantViolation {
            aggregate: "Bracket".to_string(),
            invariant: "protective and stop orders must differ".to_string(),
        };
        assert!(err.to_string().starts_with("Invariant violation in Bracket"));
    }
}
