// Allow unwrap/expect in tests - tests should panic on unexpected errors
// Allow test-specific patterns and pedantic lints in test code
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Bracket Monitor - Core Library
//!
//! Watches take-profit / stop-loss order pairs protecting one position and
//! cancels the surviving sibling once either side fills.
//!
//! # Architecture (Clean Architecture + DDD + Hexagonal)
//!
//! ## Layers (inside → outside)
//!
//! - **Domain**: Core business logic, no I/O
//!   - `order`: read-only order and position snapshots
//!   - `bracket`: bracket aggregate, reconciliation policy, cancellation guard
//!
//! - **Application**: Use cases and orchestration
//!   - `ports`: `OrderGateway`
//!   - `services`: polling monitor session and its handle
//!   - `use_cases`: bracket placement
//!
//! - **Infrastructure**: Adapters
//!   - `broker`: Alpaca REST gateway, in-memory gateway
//!
//! Cross-cutting: `broker` (retry policies), `config`, `observability`
//! (metrics) and `telemetry` (tracing subscriber).

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Clean Architecture Layers
// =============================================================================

/// Domain layer - Core business logic with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Cross-cutting
// =============================================================================

/// Retry policies with exponential backoff.
pub mod broker;

/// YAML configuration loading and validation.
pub mod config;

/// Prometheus metrics.
pub mod observability;

/// Tracing subscriber setup.
pub mod telemetry;

// =============================================================================
// Re-exports
// =============================================================================

// Domain re-exports
pub use domain::bracket::{
    Bracket, BracketLeg, BracketState, PositionDirection, ReconciliationAction, Resolution,
    ResolutionReason, ResolutionReport, resolve,
};
pub use domain::order::{OrderKind, OrderSide, OrderSnapshot, OrderStatus, PositionSnapshot};
pub use domain::shared::{BracketId, OrderId, Symbol};

// Application re-exports
pub use application::ports::{GatewayError, OrderAck, OrderGateway, OrderSpec};
pub use application::services::{
    BracketMonitor, MonitorError, MonitorHandle, MonitorOptions, SessionEnd, SessionSummary,
    start_bracket_monitor,
};
pub use application::use_cases::{PlaceBracketRequest, PlaceBracketUseCase, PlacementError};

// Infrastructure re-exports
pub use infrastructure::broker::{
    AlpacaConfig, AlpacaEnvironment, AlpacaError, AlpacaOrderGateway, InMemoryOrderGateway,
};
