//! Alpaca API request and response types.
//!
//! These types map directly to Alpaca's REST API format. Prices and
//! quantities travel as strings.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::AlpacaError;
use crate::application::ports::{OrderAck, OrderSpec};
use crate::domain::order::{OrderKind, OrderSide, OrderSnapshot, OrderStatus, PositionSnapshot};
use crate::domain::shared::{OrderId, Symbol};

// ============================================================================
// Order Request Types
// ============================================================================

/// Order request for Alpaca API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlpacaOrderRequest {
    /// Stock symbol.
    pub symbol: String,
    /// Quantity (shares).
    pub qty: String,
    /// Order side.
    pub side: String,
    /// Order type.
    #[serde(rename = "type")]
    pub order_type: String,
    /// Time in force.
    pub time_in_force: String,
    /// Limit price (limit and stop-limit orders).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<String>,
    /// Trigger price (stop and stop-limit orders).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<String>,
    /// Client order ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_order_id: Option<String>,
}

impl From<&OrderSpec> for AlpacaOrderRequest {
    fn from(spec: &OrderSpec) -> Self {
        Self {
            symbol: spec.symbol.as_str().to_string(),
            qty: spec.quantity.normalize().to_string(),
            side: spec.side.as_wire().to_string(),
            order_type: spec.kind.as_wire().to_string(),
            time_in_force: spec.time_in_force.as_wire().to_string(),
            limit_price: spec.limit_price.map(|p| p.normalize().to_string()),
            stop_price: spec.stop_price.map(|p| p.normalize().to_string()),
            client_order_id: spec.client_order_id.clone(),
        }
    }
}

// ============================================================================
// Order Response Types
// ============================================================================

/// Order response from Alpaca API.
#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaOrderResponse {
    /// Broker order ID.
    pub id: String,
    /// Client order ID.
    #[serde(default)]
    pub client_order_id: Option<String>,
    /// Symbol.
    pub symbol: String,
    /// Quantity; absent for notional orders.
    #[serde(default)]
    pub qty: Option<String>,
    /// Average fill price.
    #[serde(default)]
    pub filled_avg_price: Option<String>,
    /// Order status.
    pub status: String,
    /// Order side.
    pub side: String,
    /// Order type.
    #[serde(rename = "type")]
    pub order_type: String,
    /// Limit price.
    #[serde(default)]
    pub limit_price: Option<String>,
    /// Stop price.
    #[serde(default)]
    pub stop_price: Option<String>,
    /// Last update timestamp.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl AlpacaOrderResponse {
    /// Convert to `OrderAck`.
    #[must_use]
    pub fn to_order_ack(&self) -> OrderAck {
        OrderAck {
            order_id: OrderId::new(&self.id),
            status: parse_order_status(&self.status),
        }
    }

    /// Convert to the monitor's read-only order view.
    ///
    /// # Errors
    ///
    /// Returns `AlpacaError::InvalidResponse` if the side or a numeric field
    /// cannot be parsed.
    pub fn to_snapshot(&self) -> Result<OrderSnapshot, AlpacaError> {
        let side = parse_side(&self.side)?;
        let quantity = parse_optional_decimal("qty", self.qty.as_deref())?.unwrap_or(Decimal::ZERO);

        let mut snapshot = OrderSnapshot::new(
            OrderId::new(&self.id),
            Symbol::new(&self.symbol),
            side,
            parse_order_kind(&self.order_type),
            quantity,
            parse_order_status(&self.status),
        );
        if let Some(price) = parse_optional_decimal("limit_price", self.limit_price.as_deref())? {
            snapshot = snapshot.with_limit_price(price);
        }
        if let Some(price) = parse_optional_decimal("stop_price", self.stop_price.as_deref())? {
            snapshot = snapshot.with_stop_price(price);
        }
        if let Some(price) =
            parse_optional_decimal("filled_avg_price", self.filled_avg_price.as_deref())?
        {
            snapshot = snapshot.with_filled_price(price);
        }
        if let Some(updated_at) = self.updated_at {
            snapshot.observed_at = updated_at;
        }
        Ok(snapshot)
    }
}

// ============================================================================
// Position Types
// ============================================================================

/// Position response from Alpaca API.
#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaPositionResponse {
    /// Symbol.
    pub symbol: String,
    /// Quantity. Negative for shorts on current API versions.
    pub qty: String,
    /// Side (long/short).
    pub side: String,
    /// Average entry price.
    pub avg_entry_price: String,
}

impl AlpacaPositionResponse {
    /// Convert to a signed position view.
    ///
    /// # Errors
    ///
    /// Returns `AlpacaError::InvalidResponse` if a numeric field is malformed.
    pub fn to_snapshot(&self) -> Result<PositionSnapshot, AlpacaError> {
        let qty = parse_decimal("qty", &self.qty)?;
        let net_quantity = if self.side.eq_ignore_ascii_case("short") {
            -qty.abs()
        } else {
            qty
        };
        Ok(PositionSnapshot {
            symbol: Symbol::new(&self.symbol),
            net_quantity,
            avg_price: parse_decimal("avg_entry_price", &self.avg_entry_price)?,
        })
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Error response from Alpaca API.
#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaErrorResponse {
    /// Error code. Alpaca sends a number; some proxies send a string.
    #[serde(default)]
    pub code: Option<serde_json::Value>,
    /// Error message.
    pub message: String,
}

impl AlpacaErrorResponse {
    /// Error code rendered as text.
    #[must_use]
    pub fn code_text(&self) -> Option<String> {
        self.code.as_ref().map(|code| match code {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Parse Alpaca order status string to domain `OrderStatus`.
#[must_use]
pub fn parse_order_status(status: &str) -> OrderStatus {
    match status.to_ascii_lowercase().as_str() {
        "new" | "accepted" | "pending_new" | "accepted_for_bidding" => OrderStatus::Pending,
        "partially_filled" | "replaced" | "pending_replace" | "pending_cancel" | "held"
        | "calculated" => OrderStatus::Open,
        "filled" => OrderStatus::Filled,
        "canceled" | "expired" | "done_for_day" => OrderStatus::Cancelled,
        "rejected" => OrderStatus::Rejected,
        _ => OrderStatus::Unknown,
    }
}

fn parse_order_kind(order_type: &str) -> OrderKind {
    match order_type {
        "trailing_stop" => OrderKind::Stop,
        other => OrderKind::from_wire(other).unwrap_or(OrderKind::Market),
    }
}

fn parse_side(side: &str) -> Result<OrderSide, AlpacaError> {
    match side.to_ascii_lowercase().as_str() {
        "buy" => Ok(OrderSide::Buy),
        "sell" => Ok(OrderSide::Sell),
        other => Err(AlpacaError::InvalidResponse(format!(
            "unknown order side: {other}"
        ))),
    }
}

fn parse_decimal(field: &str, value: &str) -> Result<Decimal, AlpacaError> {
    Decimal::from_str(value)
        .map_err(|e| AlpacaError::InvalidResponse(format!("{field} = {value:?}: {e}")))
}

fn parse_optional_decimal(field: &str, value: Option<&str>) -> Result<Option<Decimal>, AlpacaError> {
    value.map(|v| parse_decimal(field, v)).transpose()
}
