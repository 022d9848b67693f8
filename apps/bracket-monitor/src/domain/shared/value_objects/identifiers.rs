//! Strongly-typed identifiers for domain entities.
//!
//! These prevent mixing up a gateway order id with a bracket id.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier from a string.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the inner string value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns true if the identifier is empty or whitespace.
            #[must_use]
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }

            /// Consume and return the inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

define_id!(
    OrderId,
    "Gateway-assigned order identifier (opaque to the monitor)."
);
define_id!(BracketId, "Unique identifier for a monitored bracket.");

impl BracketId {
    /// Generate a new unique bracket identifier using UUID v4.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("bracket-{}", uuid::Uuid::new_v4()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_id_new_and_display() {
        let id = OrderId::new("ord-123");
        assert_eq!(id.as_str(), "ord-123");
        assert_eq!(format!("{id}"), "ord-123");
    }

    #[test]
    fn order_id_from_string() {
        let id: OrderId = "ord-123".into();
        assert_eq!(id.as_str(), "ord-123");

        let id: OrderId = String::from("ord-456").into();
        assert_eq!(id.as_str(), "ord-456");
    }

    #[test]
    fn blank_ids_are_detected() {
        assert!(OrderId::new("").is_blank());
        assert!(OrderId::new("   ").is_blank());
        assert!(!OrderId::new("ord-1").is_blank());
    }

    #[test]
    fn bracket_id_generate_is_unique_and_prefixed() {
        let a = BracketId::generate();
        let b = BracketId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("bracket-"));
    }

    #[test]
    fn into_inner_returns_raw_value() {
        assert_eq!(BracketId::new("b-1").into_inner(), "b-1");
    }
}
