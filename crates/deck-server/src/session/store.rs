//! Session records and the store seam.
//!
//! The store is a pure data layer: it knows nothing about TTL policy or
//! authentication. The `SessionStore` trait is the seam that lets the
//! manager run against the in-memory store in production and against
//! failure-injecting fakes in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A server-side session binding an opaque token to a wallet address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Opaque unique token, used only for lookup.
    pub session_id: String,

    /// The authenticated wallet address bound at creation.
    pub address: String,

    /// When the session was created.
    pub created_at: DateTime<Utc>,

    /// When the session stops being valid. Fixed at creation.
    pub expires_at: DateTime<Utc>,

    /// Last successful verification. Observability only; never moves
    /// `expires_at`.
    pub last_seen_at: DateTime<Utc>,
}

impl Session {
    /// Whether the session is expired as of `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Errors that can occur in the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store is unreachable.
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence seam for session records.
///
/// Mutations must be mutually exclusive per session id but independent
/// across ids; implementations must not take a global lock.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a session record, replacing any record with the same id.
    async fn insert(&self, session: Session) -> Result<(), StoreError>;

    /// Look up a session by id.
    async fn get(&self, session_id: &str) -> Result<Option<Session>, StoreError>;

    /// Delete a session by id, returning the removed record if present.
    async fn remove(&self, session_id: &str) -> Result<Option<Session>, StoreError>;

    /// Update `last_seen_at` for a session, if it still exists.
    async fn touch(&self, session_id: &str, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Delete every record with `expires_at <= now`; returns how many were
    /// removed.
    async fn remove_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;

    /// Number of records currently in the store.
    async fn len(&self) -> Result<usize, StoreError>;
}

/// In-memory session store.
///
/// DashMap shards give per-key mutual exclusion without a global lock, so
/// concurrent creates, verifies, and sweeps on different ids never contend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: DashMap<String, Session>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert(&self, session: Session) -> Result<(), StoreError> {
        self.sessions.insert(session.session_id.clone(), session);
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        Ok(self
            .sessions
            .get(session_id)
            .map(|entry| entry.value().clone()))
    }

    async fn remove(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.remove(session_id).map(|(_, session)| session))
    }

    async fn touch(&self, session_id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(mut entry) = self.sessions.get_mut(session_id) {
            entry.last_seen_at = at;
        }
        Ok(())
    }

    async fn remove_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut removed = 0;
        self.sessions.retain(|_, session| {
            if session.expires_at <= now {
                removed += 1;
                false
            } else {
                true
            }
        });
        Ok(removed)
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.sessions.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(id: &str, address: &str, ttl_secs: i64) -> Session {
        let now = Utc::now();
        Session {
            session_id: id.to_string(),
            address: address.to_string(),
            created_at: now,
            expires_at: now + Duration::seconds(ttl_secs),
            last_seen_at: now,
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = MemoryStore::new();
        store.insert(session("s1", "0xabc", 60)).await.unwrap();

        let found = store.get("s1").await.unwrap().unwrap();
        assert_eq!(found.address, "0xabc");
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_returns_record() {
        let store = MemoryStore::new();
        store.insert(session("s1", "0xabc", 60)).await.unwrap();

        let removed = store.remove("s1").await.unwrap();
        assert!(removed.is_some());
        assert!(store.get("s1").await.unwrap().is_none());

        // Removing again is a no-op.
        assert!(store.remove("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_touch_updates_last_seen() {
        let store = MemoryStore::new();
        store.insert(session("s1", "0xabc", 60)).await.unwrap();

        let later = Utc::now() + Duration::seconds(30);
        store.touch("s1", later).await.unwrap();

        let found = store.get("s1").await.unwrap().unwrap();
        assert_eq!(found.last_seen_at, later);

        // Touching a missing session is not an error.
        store.touch("missing", later).await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_expired_removes_exactly_the_expired_set() {
        let store = MemoryStore::new();
        store.insert(session("live-1", "0xaaa", 3600)).await.unwrap();
        store.insert(session("dead-1", "0xbbb", -10)).await.unwrap();
        store.insert(session("dead-2", "0xccc", -300)).await.unwrap();

        let removed = store.remove_expired(Utc::now()).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.len().await.unwrap(), 1);
        assert!(store.get("live-1").await.unwrap().is_some());

        // Idempotent: a second sweep removes nothing.
        let removed = store.remove_expired(Utc::now()).await.unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn test_expiry_boundary_is_inclusive() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut s = session("s1", "0xabc", 0);
        s.expires_at = now;
        store.insert(s).await.unwrap();

        // expires_at <= now counts as expired.
        let removed = store.remove_expired(now).await.unwrap();
        assert_eq!(removed, 1);
    }
}
