//! Router assembly and HTTP server lifecycle.

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::DeckConfig;
use crate::market::{MarketAggregator, MarketProvider};
use crate::session::SharedSessionManager;

use super::{auth, routes};

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<DeckConfig>,
    pub sessions: SharedSessionManager,
    pub market: MarketAggregator,
    pub provider: Arc<dyn MarketProvider>,
}

impl AppState {
    pub fn new(
        config: Arc<DeckConfig>,
        sessions: SharedSessionManager,
        market: MarketAggregator,
        provider: Arc<dyn MarketProvider>,
    ) -> Self {
        Self {
            config,
            sessions,
            market,
            provider,
        }
    }
}

/// Create the API router with all endpoints.
///
/// Everything in the protected router sits behind the auth middleware; no
/// route may bypass it. Login, logout, health, and the maintenance trigger
/// are the only public surfaces.
pub fn create_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/maintenance/sweep", post(routes::maintenance_sweep));

    let protected = Router::new()
        .route("/api/auth/session", get(auth::current_session))
        .route("/api/market/summary", get(routes::market_summary))
        .route("/api/market/ticker/{symbol}", get(routes::market_ticker))
        .route("/api/account/balances", get(routes::account_balances))
        .route("/api/account/positions", get(routes::account_positions))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_session,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .with_state(state)
}

/// Run the API server until shutdown is signalled.
pub async fn run_server(
    state: AppState,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let enable_cors = state.config.server.enable_cors;
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);

    let app = create_router(state);

    // CORS for frontend development.
    let app = if enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app.layer(cors)
    } else {
        app
    };

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Dashboard API server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            info!("Dashboard API server shutting down");
        })
        .await?;

    Ok(())
}

/// Spawn the API server as a background task.
pub fn spawn_server(
    state: AppState,
    shutdown: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<anyhow::Result<()>> {
    tokio::spawn(async move { run_server(state, shutdown).await })
}
