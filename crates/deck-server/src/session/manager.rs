//! Session manager: sole authority over session validity.
//!
//! Creates, verifies, and invalidates sessions against an injected store.
//! Expired records are deleted the moment `verify` reads them (lazy expiry),
//! so no valid-but-expired session is ever returned even if the background
//! sweeper has not run yet.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use super::store::{Session, SessionStore, StoreError};

/// Errors returned by session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No record exists for this session id.
    #[error("session not found")]
    NotFound,

    /// The record existed but its TTL has elapsed. The record has been
    /// deleted as a side effect of the read.
    #[error("session expired")]
    Expired,

    /// The persistence layer is unreachable.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Atomic counters for session activity.
#[derive(Debug, Default)]
struct SessionStats {
    created: AtomicU64,
    verified: AtomicU64,
    rejected: AtomicU64,
    invalidated: AtomicU64,
    swept: AtomicU64,
}

/// Point-in-time snapshot of session activity counters.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatsSnapshot {
    /// Sessions created.
    pub created: u64,
    /// Successful verifications.
    pub verified: u64,
    /// Verifications rejected (unknown or expired).
    pub rejected: u64,
    /// Explicit invalidations.
    pub invalidated: u64,
    /// Records removed by sweeps.
    pub swept: u64,
}

/// Sole authority over session validity.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    ttl: Duration,
    stats: SessionStats,
}

impl SessionManager {
    /// Create a manager over the given store with a fixed TTL.
    pub fn new(store: Arc<dyn SessionStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            stats: SessionStats::default(),
        }
    }

    /// The fixed session TTL.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Create a session bound to an already-authenticated wallet address.
    ///
    /// The token is a v4 UUID: 122 bits of OS randomness, not guessable.
    pub async fn create(&self, address: &str) -> Result<Session, SessionError> {
        let now = Utc::now();
        let expires_at = chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(chrono::DateTime::<Utc>::MAX_UTC);

        let session = Session {
            session_id: Uuid::new_v4().to_string(),
            address: address.to_string(),
            created_at: now,
            expires_at,
            last_seen_at: now,
        };

        self.store.insert(session.clone()).await?;
        self.stats.created.fetch_add(1, Ordering::Relaxed);

        debug!(address = %address, expires_at = %session.expires_at, "Session created");

        Ok(session)
    }

    /// Verify a session id, returning the bound record when valid.
    ///
    /// An expired record is deleted before `Expired` is returned, so a
    /// follow-up lookup observes absence. A successful verification stamps
    /// `last_seen_at`; the TTL itself is fixed and never extended.
    pub async fn verify(&self, session_id: &str) -> Result<Session, SessionError> {
        let Some(session) = self.store.get(session_id).await? else {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(SessionError::NotFound);
        };

        let now = Utc::now();
        if session.is_expired_at(now) {
            self.store.remove(session_id).await?;
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            debug!(address = %session.address, "Expired session removed on read");
            return Err(SessionError::Expired);
        }

        self.store.touch(session_id, now).await?;
        self.stats.verified.fetch_add(1, Ordering::Relaxed);

        Ok(session)
    }

    /// Delete a session unconditionally.
    ///
    /// Idempotent: invalidating an unknown or already-expired session is
    /// not an error.
    pub async fn invalidate(&self, session_id: &str) -> Result<(), SessionError> {
        if self.store.remove(session_id).await?.is_some() {
            self.stats.invalidated.fetch_add(1, Ordering::Relaxed);
            debug!("Session invalidated");
        }
        Ok(())
    }

    /// Remove every expired record; returns how many were removed.
    ///
    /// Safe to call concurrently with `create`/`verify`/`invalidate`.
    pub async fn sweep_expired(&self) -> Result<usize, SessionError> {
        let removed = self.store.remove_expired(Utc::now()).await?;
        if removed > 0 {
            self.stats.swept.fetch_add(removed as u64, Ordering::Relaxed);
        }
        Ok(removed)
    }

    /// Number of sessions currently in the store.
    pub async fn active_sessions(&self) -> Result<usize, SessionError> {
        Ok(self.store.len().await?)
    }

    /// Get a snapshot of activity counters.
    pub fn stats(&self) -> SessionStatsSnapshot {
        SessionStatsSnapshot {
            created: self.stats.created.load(Ordering::Relaxed),
            verified: self.stats.verified.load(Ordering::Relaxed),
            rejected: self.stats.rejected.load(Ordering::Relaxed),
            invalidated: self.stats.invalidated.load(Ordering::Relaxed),
            swept: self.stats.swept.load(Ordering::Relaxed),
        }
    }
}

/// Shared reference to a SessionManager.
pub type SharedSessionManager = Arc<SessionManager>;

/// Create a new shared session manager.
pub fn new_shared(store: Arc<dyn SessionStore>, ttl: Duration) -> SharedSessionManager {
    Arc::new(SessionManager::new(store, ttl))
}
