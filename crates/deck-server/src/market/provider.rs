//! Provider seam for upstream market and account data.
//!
//! The `MarketProvider` trait abstracts the exchange backend so the
//! aggregator and the account routes can run against the live client in
//! production and against scripted fakes in tests.

use async_trait::async_trait;
use thiserror::Error;

use deck_exchange::{Balance, ExchangeClient, ExchangeError, IndexPrice, Position, Ticker};

/// Errors that can occur when fetching from the upstream provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The exchange client failed (connection, timeout, bad status, parse).
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    /// The provider is unavailable for another reason.
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// Upstream source of market and account data.
///
/// Implementations must bound every call with a timeout; a hung upstream
/// surfaces as an error, never as an indefinitely pending future.
#[async_trait]
pub trait MarketProvider: Send + Sync {
    /// 24h tickers for all listed pairs.
    async fn tickers(&self) -> Result<Vec<Ticker>, ProviderError>;

    /// Aggregate market indices.
    async fn index_prices(&self) -> Result<Vec<IndexPrice>, ProviderError>;

    /// 24h ticker for a single pair.
    async fn ticker(&self, symbol: &str) -> Result<Ticker, ProviderError>;

    /// Asset balances for an account address.
    async fn balances(&self, address: &str) -> Result<Vec<Balance>, ProviderError>;

    /// Open positions for an account address.
    async fn positions(&self, address: &str) -> Result<Vec<Position>, ProviderError>;
}

/// Live provider backed by the exchange backend HTTP API.
pub struct LiveProvider {
    client: ExchangeClient,
}

impl LiveProvider {
    /// Wrap an exchange client. Timeouts are the client's responsibility.
    pub fn new(client: ExchangeClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MarketProvider for LiveProvider {
    async fn tickers(&self) -> Result<Vec<Ticker>, ProviderError> {
        Ok(self.client.tickers().await?)
    }

    async fn index_prices(&self) -> Result<Vec<IndexPrice>, ProviderError> {
        Ok(self.client.index_prices().await?)
    }

    async fn ticker(&self, symbol: &str) -> Result<Ticker, ProviderError> {
        Ok(self.client.ticker(symbol).await?)
    }

    async fn balances(&self, address: &str) -> Result<Vec<Balance>, ProviderError> {
        Ok(self.client.balances(address).await?)
    }

    async fn positions(&self, address: &str) -> Result<Vec<Position>, ProviderError> {
        Ok(self.client.positions(address).await?)
    }
}
