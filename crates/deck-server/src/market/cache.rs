//! Last-known-good snapshot cache for aggregated market data.
//!
//! Snapshots are stored as `Arc` values and replaced wholesale on every
//! successful fetch, so concurrent readers either see the old snapshot or
//! the new one, never a mixture.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use deck_exchange::{IndexPrice, Ticker};

/// Cache key for one aggregated market-data query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    /// The global market summary (indices + all tickers).
    Summary,
    /// A single trading pair.
    Ticker(String),
}

impl std::fmt::Display for QueryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryKey::Summary => write!(f, "summary"),
            QueryKey::Ticker(symbol) => write!(f, "ticker:{symbol}"),
        }
    }
}

/// Which path produced the data in a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataSource {
    /// Fetched from the exchange backend for this request.
    Primary,
    /// Served from a fresh cached snapshot.
    Cache,
    /// Served from a snapshot past its freshness window.
    CacheStale,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Primary => "primary",
            DataSource::Cache => "cache",
            DataSource::CacheStale => "cache-stale",
        }
    }
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The global market summary, merged from multiple upstream endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarketSummary {
    /// Aggregate market indices.
    pub indices: Vec<IndexPrice>,
    /// 24h tickers for all listed pairs.
    pub tickers: Vec<Ticker>,
}

/// Aggregated payload for one query key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MarketPayload {
    Summary(MarketSummary),
    Ticker(Ticker),
}

/// A cached market-data snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    /// The aggregated payload.
    pub payload: MarketPayload,
    /// When the payload was last successfully fetched upstream.
    pub fetched_at: DateTime<Utc>,
}

impl Snapshot {
    /// Create a snapshot stamped now.
    pub fn new(payload: MarketPayload) -> Self {
        Self {
            payload,
            fetched_at: Utc::now(),
        }
    }

    /// Snapshot age as of `now`. Clamped at zero.
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.fetched_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

/// Freshness classification of a snapshot age.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Serve as-is, no refetch.
    Fresh,
    /// Serve immediately, refresh in the background.
    Stale,
    /// Attempt a synchronous refetch before serving.
    Expired,
}

/// Age thresholds partitioning snapshot ages into freshness classes.
#[derive(Debug, Clone, Copy)]
pub struct FreshnessPolicy {
    /// Ages below this are `Fresh`.
    pub fresh_for: Duration,
    /// Ages at or above this are `Expired`; in between is `Stale`.
    pub serve_ceiling: Duration,
}

impl FreshnessPolicy {
    /// Classify a snapshot age.
    pub fn classify(&self, age: Duration) -> Freshness {
        if age < self.fresh_for {
            Freshness::Fresh
        } else if age < self.serve_ceiling {
            Freshness::Stale
        } else {
            Freshness::Expired
        }
    }
}

/// Cache of the last-known-good snapshot per query key.
#[derive(Debug, Default)]
pub struct MarketCache {
    snapshots: DashMap<QueryKey, Arc<Snapshot>>,
}

impl MarketCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current snapshot for a key.
    pub fn get(&self, key: &QueryKey) -> Option<Arc<Snapshot>> {
        self.snapshots.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Replace the snapshot for a key wholesale.
    pub fn replace(&self, key: QueryKey, snapshot: Arc<Snapshot>) {
        self.snapshots.insert(key, snapshot);
    }

    /// Number of cached keys.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Whether the cache holds no snapshots.
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}
