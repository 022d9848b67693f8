//! HTTP client wrapper with retry logic for idempotent reads.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::api_types::AlpacaErrorResponse;
use super::config::AlpacaConfig;
use super::error::AlpacaError;
use crate::broker::{ExponentialBackoffCalculator, RetryPolicy, is_retryable_status, parse_retry_after};

const KEY_HEADER: &str = "APCA-API-KEY-ID";
const SECRET_HEADER: &str = "APCA-API-SECRET-KEY";

/// HTTP client for the Alpaca trading API.
///
/// GET requests are retried under the configured transport policy. POST and
/// DELETE are sent exactly once; callers own their retry budget.
#[derive(Debug, Clone)]
pub struct AlpacaHttpClient {
    client: Client,
    api_key: String,
    api_secret: String,
    base_url: String,
    retry: RetryPolicy,
}

impl AlpacaHttpClient {
    /// Create a new HTTP client from config.
    ///
    /// # Errors
    ///
    /// Returns `AlpacaError::MissingCredentials` when the key or secret is
    /// empty, or `AlpacaError::Network` if the client cannot be built.
    pub fn new(config: &AlpacaConfig) -> Result<Self, AlpacaError> {
        if config.api_key.trim().is_empty() || config.api_secret.trim().is_empty() {
            return Err(AlpacaError::MissingCredentials);
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AlpacaError::Network(e.to_string()))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            base_url: config.trading_base_url().to_string(),
            retry: config.retry.clone(),
        })
    }

    /// GET with transport retry.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, AlpacaError> {
        let mut backoff = ExponentialBackoffCalculator::new(&self.retry);

        loop {
            let result = match self.request(Method::GET, path).send().await {
                Ok(response) => Self::decode(Method::GET, path, response).await,
                Err(e) => Err(Self::transport_error(&e)),
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) if Self::should_retry(&err) => err,
                Err(err) => return Err(err),
            };

            let Some(mut delay) = backoff.next_backoff() else {
                return Err(err);
            };
            if let AlpacaError::RateLimited {
                retry_after_secs: Some(secs),
            } = &err
            {
                delay = delay.max(Duration::from_secs(*secs));
            }

            tracing::warn!(
                path,
                error = %err,
                delay_ms = delay.as_millis(),
                retry = backoff.retries_used(),
                "Alpaca GET failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// POST a JSON body. Sent once.
    pub async fn post<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AlpacaError> {
        let response = self
            .request(Method::POST, path)
            .json(body)
            .send()
            .await
            .map_err(|e| Self::transport_error(&e))?;
        Self::decode(Method::POST, path, response).await
    }

    /// DELETE a resource. Sent once.
    pub async fn delete(&self, path: &str) -> Result<(), AlpacaError> {
        let response = self
            .request(Method::DELETE, path)
            .send()
            .await
            .map_err(|e| Self::transport_error(&e))?;
        let _: serde_json::Value = Self::decode(Method::DELETE, path, response).await?;
        Ok(())
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .header(KEY_HEADER, &self.api_key)
            .header(SECRET_HEADER, &self.api_secret)
    }

    async fn decode<T: DeserializeOwned>(
        method: Method,
        path: &str,
        response: Response,
    ) -> Result<T, AlpacaError> {
        let status = response.status();

        if status.is_success() {
            let text = response
                .text()
                .await
                .map_err(|e| AlpacaError::Network(e.to_string()))?;
            let body = if text.trim().is_empty() { "null" } else { text.as_str() };
            return serde_json::from_str(body)
                .map_err(|e| AlpacaError::InvalidResponse(e.to_string()));
        }

        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after)
            .map(|d| d.as_secs());
        let body = response.text().await.unwrap_or_default();
        let (code, message) = match serde_json::from_str::<AlpacaErrorResponse>(&body) {
            Ok(err) => (
                err.code_text().unwrap_or_else(|| status.as_u16().to_string()),
                err.message,
            ),
            Err(_) => (status.as_u16().to_string(), body),
        };

        Err(classify(&method, path, status, code, message, retry_after_secs))
    }

    fn transport_error(err: &reqwest::Error) -> AlpacaError {
        if err.is_timeout() {
            AlpacaError::Timeout
        } else {
            AlpacaError::Network(err.to_string())
        }
    }

    const fn should_retry(err: &AlpacaError) -> bool {
        matches!(
            err,
            AlpacaError::Network(_)
                | AlpacaError::Timeout
                | AlpacaError::Server { .. }
                | AlpacaError::RateLimited { .. }
        )
    }
}

/// Map a non-success response to an adapter error.
fn classify(
    method: &Method,
    path: &str,
    status: StatusCode,
    code: String,
    message: String,
    retry_after_secs: Option<u64>,
) -> AlpacaError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => AlpacaError::RateLimited { retry_after_secs },
        StatusCode::UNAUTHORIZED => AlpacaError::AuthenticationFailed(message),
        // Alpaca answers 403 for buying-power and short-availability refusals.
        StatusCode::FORBIDDEN if *method == Method::POST => AlpacaError::OrderRejected(message),
        StatusCode::FORBIDDEN => AlpacaError::AuthenticationFailed(message),
        StatusCode::NOT_FOUND => AlpacaError::NotFound(path.to_string()),
        StatusCode::UNPROCESSABLE_ENTITY => AlpacaError::OrderRejected(message),
        s if is_retryable_status(s.as_u16()) => AlpacaError::Server {
            status: s.as_u16(),
            message,
        },
        _ => AlpacaError::Api { code, message },
    }
}
