//! Alpaca order gateway implementing `OrderGateway`.

use async_trait::async_trait;

use super::api_types::{AlpacaOrderRequest, AlpacaOrderResponse, AlpacaPositionResponse};
use super::config::{AlpacaConfig, AlpacaEnvironment};
use super::error::AlpacaError;
use super::http_client::AlpacaHttpClient;
use crate::application::ports::{GatewayError, OrderAck, OrderGateway, OrderSpec};
use crate::domain::order::{OrderSnapshot, PositionSnapshot};
use crate::domain::shared::OrderId;

/// Largest page Alpaca serves for the order list.
const ORDER_PAGE_LIMIT: u32 = 500;

/// Alpaca Markets order gateway.
#[derive(Debug, Clone)]
pub struct AlpacaOrderGateway {
    client: AlpacaHttpClient,
    environment: AlpacaEnvironment,
}

impl AlpacaOrderGateway {
    /// Create a new Alpaca gateway.
    ///
    /// # Errors
    ///
    /// Returns `AlpacaError` if credentials are missing or the HTTP client
    /// cannot be built.
    pub fn new(config: &AlpacaConfig) -> Result<Self, AlpacaError> {
        let client = AlpacaHttpClient::new(config)?;
        if config.environment.is_live() {
            tracing::warn!("Alpaca gateway configured for LIVE trading");
        }
        Ok(Self {
            client,
            environment: config.environment,
        })
    }

    /// Check if we're in live trading mode.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.environment.is_live()
    }
}

#[async_trait]
impl OrderGateway for AlpacaOrderGateway {
    async fn place_order(&self, spec: OrderSpec) -> Result<OrderAck, GatewayError> {
        spec.validate().map_err(|e| GatewayError::Rejected {
            reason: e.to_string(),
        })?;

        let request = AlpacaOrderRequest::from(&spec);
        if self.is_live() {
            tracing::warn!(
                symbol = %spec.symbol,
                side = %request.side,
                order_type = %request.order_type,
                "Submitting LIVE order - this will execute real trades"
            );
        }
        tracing::info!(
            symbol = %spec.symbol,
            side = %request.side,
            order_type = %request.order_type,
            qty = %request.qty,
            limit_price = ?request.limit_price,
            stop_price = ?request.stop_price,
            "Submitting order to Alpaca"
        );

        let response: AlpacaOrderResponse = self.client.post("/v2/orders", &request).await?;
        let ack = response.to_order_ack();

        tracing::info!(
            order_id = %ack.order_id,
            status = %ack.status,
            "Order accepted by Alpaca"
        );
        Ok(ack)
    }

    async fn cancel_order(&self, order_id: &OrderId) -> Result<(), GatewayError> {
        tracing::info!(order_id = %order_id, "Cancelling order");
        self.client
            .delete(&format!("/v2/orders/{}", order_id.as_str()))
            .await
            .map_err(|e| match e {
                AlpacaError::NotFound(_) => GatewayError::NotFound {
                    order_id: order_id.as_str().to_string(),
                },
                other => other.into(),
            })
    }

    async fn list_orders(&self) -> Result<Vec<OrderSnapshot>, GatewayError> {
        let responses: Vec<AlpacaOrderResponse> = self
            .client
            .get(&format!(
                "/v2/orders?status=all&limit={ORDER_PAGE_LIMIT}&direction=desc&nested=false"
            ))
            .await?;

        let mut snapshots = Vec::with_capacity(responses.len());
        for response in &responses {
            match response.to_snapshot() {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => {
                    tracing::warn!(order_id = %response.id, error = %e, "Skipping unreadable order");
                }
            }
        }
        Ok(snapshots)
    }

    async fn list_positions(&self) -> Result<Vec<PositionSnapshot>, GatewayError> {
        let responses: Vec<AlpacaPositionResponse> = self.client.get("/v2/positions").await?;
        responses
            .iter()
            .map(|p| p.to_snapshot().map_err(GatewayError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paper_gateway_is_not_live() {
        let config = AlpacaConfig::new("key", "secret", AlpacaEnvironment::Paper);
        let gateway = AlpacaOrderGateway::new(&config).unwrap();
        assert!(!gateway.is_live());
    }

    #[test]
    fn missing_credentials_fail_construction() {
        let config = AlpacaConfig::new("key", " ", AlpacaEnvironment::Live);
        assert!(matches!(
            AlpacaOrderGateway::new(&config),
            Err(AlpacaError::MissingCredentials)
        ));
    }
}
