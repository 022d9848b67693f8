//! Order kind (market, limit, stop, stop-limit).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Order kind specifying execution behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderKind {
    /// Market order - execute at best available price.
    Market,
    /// Limit order - execute at specified price or better.
    Limit,
    /// Stop order - becomes market order when stop price is reached.
    Stop,
    /// Stop-limit order - becomes limit order when stop price is reached.
    StopLimit,
}

impl OrderKind {
    /// Returns true if this order kind requires a limit price.
    #[must_use]
    pub const fn requires_limit_price(&self) -> bool {
        matches!(self, Self::Limit | Self::StopLimit)
    }

    /// Returns true if this order kind requires a stop (trigger) price.
    #[must_use]
    pub const fn requires_stop_price(&self) -> bool {
        matches!(self, Self::Stop | Self::StopLimit)
    }

    /// Lowercase wire name used by most brokerage REST APIs.
    #[must_use]
    pub const fn as_wire(&self) -> &'static str {
        match self {
            Self::Market => "market",
            Self::Limit => "limit",
            Self::Stop => "stop",
            Self::StopLimit => "stop_limit",
        }
    }

    /// Parse a wire name, returning `None` for kinds the monitor does not model
    /// (e.g. trailing stops).
    #[must_use]
    pub fn from_wire(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "market" => Some(Self::Market),
            "limit" => Some(Self::Limit),
            "stop" => Some(Self::Stop),
            "stop_limit" => Some(Self::StopLimit),
            _ => None,
        }
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Market => write!(f, "MARKET"),
            Self::Limit => write!(f, "LIMIT"),
            Self::Stop => write!(f, "STOP"),
            Self::StopLimit => write!(f, "STOP_LIMIT"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_kind_requires_limit_price() {
        assert!(!OrderKind::Market.requires_limit_price());
        assert!(OrderKind::Limit.requires_limit_price());
        assert!(!OrderKind::Stop.requires_limit_price());
        assert!(OrderKind::StopLimit.requires_limit_price());
    }

    #[test]
    fn order_kind_requires_stop_price() {
        assert!(!OrderKind::Market.requires_stop_price());
        assert!(!OrderKind::Limit.requires_stop_price());
        assert!(OrderKind::Stop.requires_stop_price());
        assert!(OrderKind::StopLimit.requires_stop_price());
    }

    #[test]
    fn order_kind_wire_round_trip() {
        for kind in [
            OrderKind::Market,
            OrderKind::Limit,
            OrderKind::Stop,
            OrderKind::StopLimit,
        ] {
            assert_eq!(OrderKind::from_wire(kind.as_wire()), Some(kind));
        }
        assert_eq!(OrderKind::from_wire("trailing_stop"), None);
    }
}
