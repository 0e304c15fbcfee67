//! HTTP surface for the trading deck.
//!
//! Auth middleware is the single choke point for every protected route: no
//! handler behind it ever sees a raw session id, only an already-verified
//! wallet address. Market routes attach provenance metadata (data source
//! and cache age) as response headers, separate from the payload body.

pub mod auth;
pub mod routes;
pub mod server;

pub use auth::AuthedUser;
pub use routes::{ApiError, HEADER_CACHE_AGE, HEADER_DATA_SOURCE};
pub use server::{AppState, create_router, run_server, spawn_server};
