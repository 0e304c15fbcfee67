//! Background expiry sweeper.
//!
//! Runs `sweep_expired` on a fixed interval so the store stays bounded even
//! when expired sessions are never read. A failed sweep is logged and
//! retried on the next tick; it never takes the process down and never
//! blocks request-serving paths.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};

use super::manager::SharedSessionManager;

/// Statistics for the expiry sweeper.
#[derive(Debug, Default)]
pub struct SweeperStats {
    /// Completed sweep runs.
    runs: AtomicU64,
    /// Total sessions removed across all runs.
    removed: AtomicU64,
    /// Failed runs since the last success.
    consecutive_failures: AtomicU64,
}

/// Point-in-time snapshot of sweeper stats.
#[derive(Debug, Clone, Serialize)]
pub struct SweeperStatsSnapshot {
    /// Completed sweep runs.
    pub runs: u64,
    /// Total sessions removed across all runs.
    pub removed: u64,
    /// Failed runs since the last success.
    pub consecutive_failures: u64,
}

/// Periodic purge task for expired sessions.
pub struct ExpirySweeper {
    manager: SharedSessionManager,
    sweep_interval: Duration,
    stats: SweeperStats,
}

impl ExpirySweeper {
    /// Create a sweeper over the given manager.
    pub fn new(manager: SharedSessionManager, sweep_interval: Duration) -> Self {
        Self {
            manager,
            sweep_interval,
            stats: SweeperStats::default(),
        }
    }

    /// Get a snapshot of sweeper stats.
    pub fn stats(&self) -> SweeperStatsSnapshot {
        SweeperStatsSnapshot {
            runs: self.stats.runs.load(Ordering::Relaxed),
            removed: self.stats.removed.load(Ordering::Relaxed),
            consecutive_failures: self.stats.consecutive_failures.load(Ordering::Relaxed),
        }
    }

    /// Run the sweep loop until shutdown is signalled.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = interval(self.sweep_interval);

        info!(
            interval_secs = self.sweep_interval.as_secs(),
            "Expiry sweeper started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
                _ = shutdown.recv() => {
                    info!("Expiry sweeper shutting down");
                    break;
                }
            }
        }
    }

    /// Run a single sweep, recording the outcome.
    async fn sweep_once(&self) {
        match self.manager.sweep_expired().await {
            Ok(removed) => {
                self.stats.runs.fetch_add(1, Ordering::Relaxed);
                self.stats.consecutive_failures.store(0, Ordering::Relaxed);
                if removed > 0 {
                    self.stats.removed.fetch_add(removed as u64, Ordering::Relaxed);
                    debug!(removed, "Expired sessions swept");
                }
            }
            Err(e) => {
                let failures = self
                    .stats
                    .consecutive_failures
                    .fetch_add(1, Ordering::Relaxed)
                    + 1;
                warn!(
                    error = %e,
                    consecutive_failures = failures,
                    "Session sweep failed, will retry next interval"
                );
            }
        }
    }
}

/// Spawn the sweeper as a background task.
///
/// Returns the shared sweeper (for stats) and the task handle.
pub fn spawn_sweeper(
    manager: SharedSessionManager,
    sweep_interval: Duration,
    shutdown: broadcast::Receiver<()>,
) -> (Arc<ExpirySweeper>, tokio::task::JoinHandle<()>) {
    let sweeper = Arc::new(ExpirySweeper::new(manager, sweep_interval));
    let sweeper_clone = Arc::clone(&sweeper);

    let handle = tokio::spawn(async move { sweeper_clone.run(shutdown).await });

    (sweeper, handle)
}
