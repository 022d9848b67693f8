//! Application Services
//!
//! Long-running monitoring: [`MonitorSession`] runs single ticks,
//! [`BracketMonitor`] drives a session on a background task.

mod bracket_monitor;
mod monitor_options;
mod monitor_session;

pub use bracket_monitor::{
    BracketMonitor, MonitorHandle, ResolutionCallback, SessionEnd, SessionSummary,
    start_bracket_monitor,
};
pub use monitor_options::{DEFAULT_INTERVAL, DEFAULT_MAX_TICKS, MonitorError, MonitorOptions};
pub use monitor_session::{MonitorSession, TickReport};
