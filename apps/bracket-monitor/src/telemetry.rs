//! Tracing subscriber setup.
//!
//! `RUST_LOG` wins when set; otherwise the configured level applies to this
//! crate and `warn` to everything else.
//!
//! ```rust,ignore
//! use bracket_monitor::telemetry::{LogFormat, init_tracing};
//!
//! init_tracing("info", LogFormat::Json)?;
//! ```

use std::str::FromStr;

use tracing_subscriber::EnvFilter;

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, human oriented.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
    /// Single-line text.
    Compact,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            other => Err(TelemetryError::UnknownFormat(other.to_string())),
        }
    }
}

/// Errors installing the subscriber.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Format name not recognised.
    #[error("unknown log format: {0}")]
    UnknownFormat(String),
    /// Level directive could not be parsed.
    #[error("invalid log filter: {0}")]
    InvalidFilter(String),
    /// A global subscriber is already installed.
    #[error("failed to install tracing subscriber: {0}")]
    Install(String),
}

/// Filter used when `RUST_LOG` is unset.
#[must_use]
pub fn default_directive(level: &str) -> String {
    format!("warn,bracket_monitor={level}")
}

/// Install the global tracing subscriber.
///
/// # Errors
///
/// Returns `TelemetryError` if the filter is invalid or a subscriber is
/// already installed.
pub fn init_tracing(level: &str, format: LogFormat) -> Result<(), TelemetryError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive(level))
            .map_err(|e| TelemetryError::InvalidFilter(e.to_string()))?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let installed = match format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().with_current_span(false).try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
    installed.map_err(|e| TelemetryError::Install(e.to_string()))
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("pretty", LogFormat::Pretty)]
    #[test_case("JSON", LogFormat::Json)]
    #[test_case("compact", LogFormat::Compact)]
    fn parses_formats(input: &str, expected: LogFormat) {
        assert_eq!(input.parse::<LogFormat>().unwrap(), expected);
    }

    #[test]
    fn rejects_unknown_format() {
        assert!(matches!(
            "xml".parse::<LogFormat>(),
            Err(TelemetryError::UnknownFormat(_))
        ));
    }

    #[test]
    fn default_directive_targets_crate() {
        assert_eq!(default_directive("debug"), "warn,bracket_monitor=debug");
        assert!(EnvFilter::try_new(default_directive("info")).is_ok());
    }
}
