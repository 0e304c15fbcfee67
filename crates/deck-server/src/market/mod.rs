//! Market data caching and aggregation.
//!
//! The aggregator answers every market-data request from the best available
//! snapshot under a staleness budget:
//!
//! ```text
//! MarketAggregator
//! ├── MarketCache (DashMap of Arc snapshots, replaced wholesale)
//! ├── MarketProvider (trait; LiveProvider wraps the exchange client)
//! └── in-flight registry (query key → shared awaitable fetch result)
//! ```
//!
//! Staleness is never an error on this read-only path: a snapshot past its
//! budget is served with a `cache-stale` provenance tag while a refresh is
//! attempted, and only a cold-cache fetch failure propagates to the caller.

pub mod aggregator;
pub mod cache;
pub mod provider;

pub use aggregator::{AggregatorStatsSnapshot, MarketAggregator, MarketError, Served};
pub use cache::{
    DataSource, Freshness, FreshnessPolicy, MarketCache, MarketPayload, MarketSummary, QueryKey,
    Snapshot,
};
pub use provider::{LiveProvider, MarketProvider, ProviderError};
