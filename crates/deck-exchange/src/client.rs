//! HTTP client for the exchange backend.
//!
//! Every request carries a bounded timeout so a slow upstream can never
//! leave a caller pending indefinitely; a timeout surfaces as an
//! `ExchangeError::Http` with `is_timeout()` set on the inner error.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::types::{Balance, IndexPrice, Position, Ticker};

/// Default request timeout for exchange API calls.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur when talking to the exchange backend.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// HTTP request failed (connection error or timeout).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error status.
    #[error("API error: status {status}, body: {body}")]
    Api { status: u16, body: String },

    /// JSON parsing failed.
    #[error("JSON parsing failed: {0}")]
    Json(String),
}

/// Client for the exchange backend REST API.
pub struct ExchangeClient {
    /// HTTP client for API requests.
    http: Client,
    /// Base URL of the exchange backend.
    base_url: String,
}

impl ExchangeClient {
    /// Create a new client with the default request timeout.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ExchangeError> {
        Self::with_timeout(base_url, REQUEST_TIMEOUT)
    }

    /// Create a new client with a custom request timeout.
    pub fn with_timeout(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ExchangeError> {
        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Base URL this client talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch 24h tickers for all listed pairs.
    pub async fn tickers(&self) -> Result<Vec<Ticker>, ExchangeError> {
        self.get_json("/api/v1/market/tickers").await
    }

    /// Fetch the 24h ticker for a single pair.
    pub async fn ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError> {
        self.get_json(&format!("/api/v1/market/tickers/{symbol}")).await
    }

    /// Fetch aggregate market indices.
    pub async fn index_prices(&self) -> Result<Vec<IndexPrice>, ExchangeError> {
        self.get_json("/api/v1/market/indices").await
    }

    /// Fetch asset balances for an account address.
    pub async fn balances(&self, address: &str) -> Result<Vec<Balance>, ExchangeError> {
        self.get_json(&format!("/api/v1/accounts/{address}/balances")).await
    }

    /// Fetch open positions for an account address.
    pub async fn positions(&self, address: &str) -> Result<Vec<Position>, ExchangeError> {
        self.get_json(&format!("/api/v1/accounts/{address}/positions")).await
    }

    /// Issue a GET request and decode the JSON response body.
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ExchangeError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "Exchange API request");

        let response = self.http.get(&url).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExchangeError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ExchangeError::Json(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_strips_trailing_slash() {
        let client = ExchangeClient::new("http://localhost:8090/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8090");
    }

    #[test]
    fn test_client_keeps_clean_base_url() {
        let client = ExchangeClient::new("https://exchange.example.com").unwrap();
        assert_eq!(client.base_url(), "https://exchange.example.com");
    }

    #[test]
    fn test_api_error_display() {
        let error = ExchangeError::Api {
            status: 503,
            body: "maintenance".to_string(),
        };
        assert_eq!(error.to_string(), "API error: status 503, body: maintenance");
    }
}
