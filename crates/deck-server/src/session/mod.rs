//! Session management for the wallet-gated dashboard.
//!
//! A session binds an opaque token to an authenticated wallet address for a
//! bounded time. Expiry is enforced by two independent paths sharing the same
//! store abstraction:
//!
//! - **Lazy expiry**: `verify` deletes an expired record the moment it is
//!   read, so a stale session can never authenticate a request even if the
//!   sweeper has not run yet.
//! - **Periodic sweep**: the `ExpirySweeper` purges expired records in the
//!   background to bound store size even when no one reads them.
//!
//! ## Architecture
//!
//! ```text
//! SessionManager
//! ├── SessionStore (trait)
//! │   └── MemoryStore (DashMap, sharded per-key locking)
//! └── SessionStats (atomic counters)
//! ExpirySweeper ──calls──▶ SessionManager::sweep_expired
//! ```

pub mod manager;
pub mod store;
pub mod sweeper;

pub use manager::{
    SessionError, SessionManager, SessionStatsSnapshot, SharedSessionManager, new_shared,
};
pub use store::{MemoryStore, Session, SessionStore, StoreError};
pub use sweeper::{ExpirySweeper, SweeperStatsSnapshot, spawn_sweeper};
