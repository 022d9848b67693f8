//! Order status as observed through the gateway.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Order status as reported by a gateway snapshot.
///
/// Deliberately coarser than the broker's own vocabulary: adapters map their
/// native statuses onto this set and anything unrecognised becomes `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Accepted by the gateway, not yet working at the venue.
    Pending,
    /// Working at the venue (includes partially filled).
    Open,
    /// Completely filled.
    Filled,
    /// Cancelled (including expired).
    Cancelled,
    /// Rejected by the venue.
    Rejected,
    /// Not reported or not understood.
    Unknown,
}

impl OrderStatus {
    /// Returns true if no further transition can occur (filled, cancelled, rejected).
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled | Self::Rejected)
    }

    /// Returns true if the order is filled.
    #[must_use]
    pub const fn is_filled(&self) -> bool {
        matches!(self, Self::Filled)
    }

    /// Returns true if the order ended without a fill.
    #[must_use]
    pub const fn is_dead(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Rejected)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Open => write!(f, "OPEN"),
            Self::Filled => write!(f, "FILLED"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Rejected => write!(f, "REJECTED"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_status_is_terminal() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Open.is_terminal());
        assert!(!OrderStatus::Unknown.is_terminal());
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
    }

    #[test]
    fn order_status_is_dead() {
        assert!(OrderStatus::Cancelled.is_dead());
        assert!(OrderStatus::Rejected.is_dead());
        assert!(!OrderStatus::Filled.is_dead());
        assert!(!OrderStatus::Open.is_dead());
    }

    #[test]
    fn order_status_display() {
        assert_eq!(OrderStatus::Filled.to_string(), "FILLED");
        assert_eq!(OrderStatus::Unknown.to_string(), "UNKNOWN");
    }
}
