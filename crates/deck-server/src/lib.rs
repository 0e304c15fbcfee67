//! Deck server: wallet-gated trading dashboard backend.
//!
//! Every protected request resolves an authenticated wallet identity from a
//! session cookie, then reads market data through a staleness-aware cache in
//! front of an unreliable exchange backend.
//!
//! ## Modules
//!
//! - `config`: Configuration loading and validation
//! - `session`: Session store, manager, and background expiry sweeper
//! - `market`: Snapshot cache, provider seam, and fetch-or-serve aggregator
//! - `dashboard`: axum HTTP surface (auth middleware, routes, server)

pub mod config;
pub mod dashboard;
pub mod market;
pub mod session;

pub use config::DeckConfig;
pub use dashboard::{AppState, create_router, run_server, spawn_server};
pub use market::{
    DataSource, Freshness, MarketAggregator, MarketCache, MarketError, MarketPayload,
    MarketProvider, MarketSummary, ProviderError, QueryKey, Served, Snapshot,
};
pub use session::{
    ExpirySweeper, MemoryStore, Session, SessionError, SessionManager, SessionStore,
    SharedSessionManager, StoreError, spawn_sweeper,
};
