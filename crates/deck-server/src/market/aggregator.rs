//! Fetch-or-serve orchestration for market data.
//!
//! Per query key the aggregator walks a small state machine:
//!
//! - **miss**: no snapshot cached; fetch synchronously, propagate failure.
//! - **fresh**: serve the cached snapshot as-is.
//! - **stale**: serve the cached snapshot immediately and refresh in the
//!   background; a failed refresh leaves the stale snapshot authoritative.
//! - **expired**: attempt a synchronous refetch; on failure serve the old
//!   snapshot anyway, tagged stale.
//!
//! Concurrent requests for the same key never issue duplicate upstream
//! fetches: an explicit in-flight registry maps each key to a shared
//! awaitable result, and late arrivals attach to it instead of fetching.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::cache::{
    DataSource, Freshness, FreshnessPolicy, MarketCache, MarketPayload, MarketSummary, QueryKey,
    Snapshot,
};
use super::provider::{MarketProvider, ProviderError};

/// Error surfaced when market data cannot be served at all.
#[derive(Debug, Error)]
pub enum MarketError {
    /// The upstream provider failed with no snapshot to fall back on.
    #[error("upstream unavailable at {at}: {reason}")]
    Upstream { at: DateTime<Utc>, reason: String },
}

/// Outcome of one upstream fetch, shared between coalesced callers.
#[derive(Debug, Clone)]
struct FetchFailure {
    at: DateTime<Utc>,
    reason: String,
}

impl FetchFailure {
    fn new(error: &ProviderError) -> Self {
        Self {
            at: Utc::now(),
            reason: error.to_string(),
        }
    }
}

impl From<FetchFailure> for MarketError {
    fn from(failure: FetchFailure) -> Self {
        MarketError::Upstream {
            at: failure.at,
            reason: failure.reason,
        }
    }
}

type FetchOutcome = Result<Arc<Snapshot>, FetchFailure>;

/// Registration against the in-flight registry: either this caller fetches,
/// or it attaches to a fetch that is already running.
enum Registration {
    Leader(watch::Sender<Option<FetchOutcome>>),
    Follower(watch::Receiver<Option<FetchOutcome>>),
}

/// A snapshot plus the provenance of this particular response.
#[derive(Debug, Clone)]
pub struct Served {
    /// The snapshot backing the response.
    pub snapshot: Arc<Snapshot>,
    /// Which path produced the data.
    pub source: DataSource,
    /// Seconds since the snapshot was fetched, when served from cache.
    pub cache_age_secs: Option<u64>,
}

/// Atomic counters for aggregator activity.
#[derive(Debug, Default)]
struct AggregatorStats {
    upstream_fetches: AtomicU64,
    cache_hits: AtomicU64,
    stale_serves: AtomicU64,
    fallback_serves: AtomicU64,
    refresh_failures: AtomicU64,
}

/// Point-in-time snapshot of aggregator stats.
#[derive(Debug, Clone, Serialize)]
pub struct AggregatorStatsSnapshot {
    /// Successful upstream fetches.
    pub upstream_fetches: u64,
    /// Responses served from a fresh snapshot.
    pub cache_hits: u64,
    /// Responses served from a stale snapshot.
    pub stale_serves: u64,
    /// Responses served past the staleness ceiling after a failed refetch.
    pub fallback_serves: u64,
    /// Background refreshes that failed.
    pub refresh_failures: u64,
}

/// Staleness-aware aggregator in front of the upstream provider.
///
/// Cheap to clone: clones share the cache, the in-flight registry, and the
/// counters, so background refreshes can outlive the requesting call chain.
#[derive(Clone)]
pub struct MarketAggregator {
    inner: Arc<AggregatorInner>,
}

struct AggregatorInner {
    cache: MarketCache,
    provider: Arc<dyn MarketProvider>,
    policy: FreshnessPolicy,
    /// In-flight fetches by query key. Guards against duplicate upstream
    /// calls; the lock is never held across an await.
    inflight: Mutex<HashMap<QueryKey, watch::Receiver<Option<FetchOutcome>>>>,
    stats: AggregatorStats,
}

impl MarketAggregator {
    /// Create an aggregator with an empty cache.
    pub fn new(provider: Arc<dyn MarketProvider>, policy: FreshnessPolicy) -> Self {
        Self {
            inner: Arc::new(AggregatorInner {
                cache: MarketCache::new(),
                provider,
                policy,
                inflight: Mutex::new(HashMap::new()),
                stats: AggregatorStats::default(),
            }),
        }
    }

    /// The snapshot cache (exposed for tests and diagnostics).
    pub fn cache(&self) -> &MarketCache {
        &self.inner.cache
    }

    /// Get a snapshot of aggregator stats.
    pub fn stats(&self) -> AggregatorStatsSnapshot {
        let stats = &self.inner.stats;
        AggregatorStatsSnapshot {
            upstream_fetches: stats.upstream_fetches.load(Ordering::Relaxed),
            cache_hits: stats.cache_hits.load(Ordering::Relaxed),
            stale_serves: stats.stale_serves.load(Ordering::Relaxed),
            fallback_serves: stats.fallback_serves.load(Ordering::Relaxed),
            refresh_failures: stats.refresh_failures.load(Ordering::Relaxed),
        }
    }

    /// Return the best available data for a query key under the staleness
    /// budget.
    ///
    /// Only a cold-cache fetch failure is an error; every other degraded
    /// state is signalled through the provenance tag and cache age.
    pub async fn get(&self, key: &QueryKey) -> Result<Served, MarketError> {
        let inner = &self.inner;

        let Some(snapshot) = inner.cache.get(key) else {
            let snapshot = inner.fetch_coalesced(key).await?;
            return Ok(Served {
                snapshot,
                source: DataSource::Primary,
                cache_age_secs: None,
            });
        };

        let age = snapshot.age_at(Utc::now());
        match inner.policy.classify(age) {
            Freshness::Fresh => {
                inner.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
                Ok(Served {
                    snapshot,
                    source: DataSource::Cache,
                    cache_age_secs: Some(age.as_secs()),
                })
            }
            Freshness::Stale => {
                inner.stats.stale_serves.fetch_add(1, Ordering::Relaxed);
                self.spawn_refresh(key.clone());
                Ok(Served {
                    snapshot,
                    source: DataSource::CacheStale,
                    cache_age_secs: Some(age.as_secs()),
                })
            }
            Freshness::Expired => match inner.fetch_coalesced(key).await {
                Ok(fresh) => Ok(Served {
                    snapshot: fresh,
                    source: DataSource::Primary,
                    cache_age_secs: None,
                }),
                Err(failure) => {
                    inner.stats.fallback_serves.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        key = %key,
                        age_secs = age.as_secs(),
                        error = %failure.reason,
                        "Refetch failed, serving snapshot past its staleness budget"
                    );
                    Ok(Served {
                        snapshot,
                        source: DataSource::CacheStale,
                        cache_age_secs: Some(age.as_secs()),
                    })
                }
            },
        }
    }

    /// Kick off a non-blocking refresh for a key, unless one is already in
    /// flight.
    fn spawn_refresh(&self, key: QueryKey) {
        if self.inner.inflight.lock().contains_key(&key) {
            return;
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            if let Err(failure) = inner.fetch_coalesced(&key).await {
                inner.stats.refresh_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    key = %key,
                    error = %failure.reason,
                    "Background refresh failed, stale snapshot remains authoritative"
                );
            } else {
                debug!(key = %key, "Background refresh completed");
            }
        });
    }
}

impl AggregatorInner {
    /// Fetch a key from upstream, coalescing with any fetch already in
    /// flight for the same key.
    async fn fetch_coalesced(&self, key: &QueryKey) -> FetchOutcome {
        let registration = {
            let mut inflight = self.inflight.lock();
            if let Some(rx) = inflight.get(key) {
                Registration::Follower(rx.clone())
            } else {
                let (tx, rx) = watch::channel(None);
                inflight.insert(key.clone(), rx);
                Registration::Leader(tx)
            }
        };

        match registration {
            Registration::Follower(mut rx) => match rx.wait_for(Option::is_some).await {
                Ok(outcome) => (*outcome).clone().unwrap_or_else(|| {
                    Err(FetchFailure {
                        at: Utc::now(),
                        reason: "in-flight fetch produced no result".to_string(),
                    })
                }),
                Err(_) => Err(FetchFailure {
                    at: Utc::now(),
                    reason: "in-flight fetch aborted".to_string(),
                }),
            },
            Registration::Leader(tx) => {
                let outcome = self.fetch_fresh(key).await;
                self.inflight.lock().remove(key);
                let _ = tx.send(Some(outcome.clone()));
                outcome
            }
        }
    }

    /// Perform the actual upstream fetch and replace the cached snapshot on
    /// success. A failed fetch caches nothing.
    async fn fetch_fresh(&self, key: &QueryKey) -> FetchOutcome {
        let payload = match key {
            QueryKey::Summary => {
                let (tickers, indices) =
                    tokio::join!(self.provider.tickers(), self.provider.index_prices());
                let tickers = tickers.map_err(|e| FetchFailure::new(&e))?;
                let indices = indices.map_err(|e| FetchFailure::new(&e))?;
                MarketPayload::Summary(MarketSummary { indices, tickers })
            }
            QueryKey::Ticker(symbol) => {
                let ticker = self
                    .provider
                    .ticker(symbol)
                    .await
                    .map_err(|e| FetchFailure::new(&e))?;
                MarketPayload::Ticker(ticker)
            }
        };

        let snapshot = Arc::new(Snapshot::new(payload));
        self.cache.replace(key.clone(), Arc::clone(&snapshot));
        self.stats.upstream_fetches.fetch_add(1, Ordering::Relaxed);

        debug!(key = %key, "Snapshot replaced from upstream");

        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    use deck_exchange::{Balance, IndexPrice, Position, Ticker};

    fn ticker(symbol: &str) -> Ticker {
        Ticker {
            symbol: symbol.to_string(),
            last_price: dec!(96000),
            change_24h: dec!(0.01),
            high_24h: dec!(97000),
            low_24h: dec!(95000),
            volume_24h: dec!(1000000),
        }
    }

    /// Scripted provider with call counting and switchable failure.
    struct MockProvider {
        calls: AtomicUsize,
        fail: std::sync::atomic::AtomicBool,
    }

    impl MockProvider {
        fn working() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: std::sync::atomic::AtomicBool::new(false),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: std::sync::atomic::AtomicBool::new(true),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn check(&self) -> Result<(), ProviderError> {
            if self.fail.load(Ordering::SeqCst) {
                Err(ProviderError::Unavailable("injected outage".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl MarketProvider for MockProvider {
        async fn tickers(&self) -> Result<Vec<Ticker>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.check()?;
            Ok(vec![ticker("BTC-USD"), ticker("ETH-USD")])
        }

        async fn index_prices(&self) -> Result<Vec<IndexPrice>, ProviderError> {
            self.check()?;
            Ok(vec![])
        }

        async fn ticker(&self, symbol: &str) -> Result<Ticker, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.check()?;
            Ok(ticker(symbol))
        }

        async fn balances(&self, _address: &str) -> Result<Vec<Balance>, ProviderError> {
            self.check()?;
            Ok(vec![])
        }

        async fn positions(&self, _address: &str) -> Result<Vec<Position>, ProviderError> {
            self.check()?;
            Ok(vec![])
        }
    }

    fn policy() -> FreshnessPolicy {
        FreshnessPolicy {
            fresh_for: Duration::from_secs(300),
            serve_ceiling: Duration::from_secs(1800),
        }
    }

    fn aggregator(provider: Arc<MockProvider>) -> MarketAggregator {
        MarketAggregator::new(provider, policy())
    }

    /// Pre-populate the cache with a snapshot of the given age.
    fn seed_snapshot(aggregator: &MarketAggregator, key: QueryKey, age_secs: i64) {
        let snapshot = Snapshot {
            payload: MarketPayload::Ticker(ticker("BTC-USD")),
            fetched_at: Utc::now() - chrono::Duration::seconds(age_secs),
        };
        aggregator.cache().replace(key, Arc::new(snapshot));
    }

    /// Wait until `condition` holds, or fail after two seconds.
    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition never became true");
    }

    #[tokio::test]
    async fn test_miss_fetches_and_primes_cache() {
        let provider = MockProvider::working();
        let aggregator = aggregator(provider.clone());
        let key = QueryKey::Ticker("BTC-USD".to_string());

        let served = aggregator.get(&key).await.unwrap();
        assert_eq!(served.source, DataSource::Primary);
        assert!(served.cache_age_secs.is_none());
        assert_eq!(provider.call_count(), 1);

        // Immediately after, the snapshot is fresh cache with near-zero age.
        let served = aggregator.get(&key).await.unwrap();
        assert_eq!(served.source, DataSource::Cache);
        assert!(served.cache_age_secs.unwrap() < 5);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_miss_failure_propagates_and_caches_nothing() {
        let provider = MockProvider::failing();
        let aggregator = aggregator(provider.clone());
        let key = QueryKey::Ticker("BTC-USD".to_string());

        let result = aggregator.get(&key).await;
        assert!(matches!(result, Err(MarketError::Upstream { .. })));
        assert!(aggregator.cache().is_empty());
    }

    #[tokio::test]
    async fn test_stale_serves_immediately_then_refreshes() {
        let provider = MockProvider::working();
        let aggregator = aggregator(provider.clone());
        let key = QueryKey::Ticker("BTC-USD".to_string());
        seed_snapshot(&aggregator, key.clone(), 400);

        let served = aggregator.get(&key).await.unwrap();
        assert_eq!(served.source, DataSource::CacheStale);
        let age = served.cache_age_secs.unwrap();
        assert!((395..=405).contains(&age));

        // The background refresh replaces the snapshot for later requests.
        wait_until(|| aggregator.stats().upstream_fetches >= 1).await;
        let served = aggregator.get(&key).await.unwrap();
        assert_eq!(served.source, DataSource::Cache);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_stale_refresh_failure_is_swallowed() {
        let provider = MockProvider::failing();
        let aggregator = aggregator(provider.clone());
        let key = QueryKey::Ticker("BTC-USD".to_string());
        seed_snapshot(&aggregator, key.clone(), 400);

        let served = aggregator.get(&key).await.unwrap();
        assert_eq!(served.source, DataSource::CacheStale);

        // The failed refresh leaves the stale snapshot authoritative; the
        // caller keeps getting data, never an error.
        wait_until(|| aggregator.stats().refresh_failures >= 1).await;
        let served = aggregator.get(&key).await.unwrap();
        assert_eq!(served.source, DataSource::CacheStale);
        assert!(served.cache_age_secs.unwrap() >= 395);
    }

    #[tokio::test]
    async fn test_expired_refetches_synchronously() {
        let provider = MockProvider::working();
        let aggregator = aggregator(provider.clone());
        let key = QueryKey::Ticker("BTC-USD".to_string());
        seed_snapshot(&aggregator, key.clone(), 2000);

        let served = aggregator.get(&key).await.unwrap();
        assert_eq!(served.source, DataSource::Primary);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_expired_with_failing_upstream_serves_fallback() {
        let provider = MockProvider::failing();
        let aggregator = aggregator(provider.clone());
        let key = QueryKey::Ticker("BTC-USD".to_string());
        seed_snapshot(&aggregator, key.clone(), 2000);

        let served = aggregator.get(&key).await.unwrap();
        assert_eq!(served.source, DataSource::CacheStale);
        assert!(served.cache_age_secs.unwrap() >= 1995);
        assert_eq!(aggregator.stats().fallback_serves, 1);
    }

    #[tokio::test]
    async fn test_summary_merges_tickers_and_indices() {
        let provider = MockProvider::working();
        let aggregator = aggregator(provider.clone());

        let served = aggregator.get(&QueryKey::Summary).await.unwrap();
        match &served.snapshot.payload {
            MarketPayload::Summary(summary) => {
                assert_eq!(summary.tickers.len(), 2);
            }
            other => panic!("expected summary payload, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_coalesce() {
        let provider = MockProvider::working();
        let aggregator = aggregator(provider.clone());

        let btc_key = QueryKey::Ticker("BTC-USD".to_string());
        let eth_key = QueryKey::Ticker("ETH-USD".to_string());
        let btc = aggregator.get(&btc_key);
        let eth = aggregator.get(&eth_key);
        let (btc, eth) = tokio::join!(btc, eth);

        btc.unwrap();
        eth.unwrap();
        assert_eq!(provider.call_count(), 2);
        assert_eq!(aggregator.cache().len(), 2);
    }
}
