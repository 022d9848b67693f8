//! Time in force for resting orders.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How long an order remains working at the venue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeInForce {
    /// Valid for the current trading day.
    Day,
    /// Good 'til canceled. Protective orders default to this.
    #[default]
    Gtc,
}

impl TimeInForce {
    /// Lowercase wire name.
    #[must_use]
    pub const fn as_wire(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Gtc => "gtc",
        }
    }
}

impl fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Day => write!(f, "DAY"),
            Self::Gtc => write!(f, "GTC"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_gtc() {
        assert_eq!(TimeInForce::default(), TimeInForce::Gtc);
        assert_eq!(TimeInForce::Gtc.as_wire(), "gtc");
    }
}
