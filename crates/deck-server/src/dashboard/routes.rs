//! REST API handlers for the dashboard.
//!
//! Market endpoints answer from the aggregator and attach provenance as
//! response headers; account endpoints validate the session and forward to
//! the exchange backend with the session's address.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use deck_exchange::{Balance, Position};

use crate::market::{MarketError, QueryKey, Served};

use super::auth::AuthedUser;
use super::server::AppState;

/// Response header carrying the data-source provenance tag.
pub const HEADER_DATA_SOURCE: &str = "x-data-source";

/// Response header carrying the cache age in seconds, when served from cache.
pub const HEADER_CACHE_AGE: &str = "x-cache-age";

/// Request header carrying the maintenance shared secret.
pub const HEADER_MAINTENANCE_TOKEN: &str = "x-maintenance-token";

// ============================================================================
// API Types
// ============================================================================

/// API error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub message: String,
}

impl ApiError {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("bad_request", message)
    }

    /// The one body every authentication failure maps to.
    pub fn unauthorized() -> Self {
        Self::new("unauthorized", "authentication required")
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new("upstream_unavailable", message)
    }
}

/// Response body for the maintenance sweep trigger.
#[derive(Debug, Serialize, Deserialize)]
pub struct SweepResponse {
    /// Number of expired sessions removed.
    pub removed: usize,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/health - liveness plus component stats.
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "sessions": state.sessions.stats(),
        "market": state.market.stats(),
    }))
}

/// GET /api/market/summary - the aggregated market summary.
pub async fn market_summary(State(state): State<AppState>) -> Response {
    match state.market.get(&QueryKey::Summary).await {
        Ok(served) => served_response(served),
        Err(e) => market_error_response(e),
    }
}

/// GET /api/market/ticker/{symbol} - a single pair's ticker.
pub async fn market_ticker(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Response {
    if !is_symbol(&symbol) {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiError::bad_request("invalid symbol")),
        )
            .into_response();
    }

    let key = QueryKey::Ticker(symbol.to_uppercase());
    match state.market.get(&key).await {
        Ok(served) => served_response(served),
        Err(e) => market_error_response(e),
    }
}

/// GET /api/account/balances - balances for the authenticated address.
pub async fn account_balances(
    State(state): State<AppState>,
    Extension(user): Extension<AuthedUser>,
) -> Result<Json<Vec<Balance>>, (StatusCode, Json<ApiError>)> {
    state
        .provider
        .balances(&user.address)
        .await
        .map(Json)
        .map_err(|e| {
            warn!(error = %e, "Balance fetch failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(ApiError::upstream(format!(
                    "exchange unavailable at {}: {e}",
                    Utc::now()
                ))),
            )
        })
}

/// GET /api/account/positions - open positions for the authenticated address.
pub async fn account_positions(
    State(state): State<AppState>,
    Extension(user): Extension<AuthedUser>,
) -> Result<Json<Vec<Position>>, (StatusCode, Json<ApiError>)> {
    state
        .provider
        .positions(&user.address)
        .await
        .map(Json)
        .map_err(|e| {
            warn!(error = %e, "Position fetch failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(ApiError::upstream(format!(
                    "exchange unavailable at {}: {e}",
                    Utc::now()
                ))),
            )
        })
}

/// POST /api/maintenance/sweep - externally scheduled expiry sweep.
///
/// When a maintenance token is configured, the caller's credential must
/// match before the sweep runs.
pub async fn maintenance_sweep(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SweepResponse>, (StatusCode, Json<ApiError>)> {
    if let Some(expected) = &state.config.session.maintenance_token {
        let presented = headers
            .get(HEADER_MAINTENANCE_TOKEN)
            .and_then(|value| value.to_str().ok());

        if presented != Some(expected.as_str()) {
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(ApiError::unauthorized()),
            ));
        }
    }

    let removed = state.sessions.sweep_expired().await.map_err(|e| {
        error!(error = %e, "Triggered sweep failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiError::internal("session service unavailable")),
        )
    })?;

    info!(removed, "Triggered sweep completed");
    Ok(Json(SweepResponse { removed }))
}

// ============================================================================
// Response helpers
// ============================================================================

/// Build a market-data response: payload in the body, provenance in headers.
fn served_response(served: Served) -> Response {
    let mut response = Json(&served.snapshot.payload).into_response();

    let headers = response.headers_mut();
    headers.insert(
        HEADER_DATA_SOURCE,
        HeaderValue::from_static(served.source.as_str()),
    );
    if let Some(age) = served.cache_age_secs {
        headers.insert(HEADER_CACHE_AGE, HeaderValue::from(age));
    }

    response
}

fn market_error_response(error: MarketError) -> Response {
    warn!(error = %error, "Market data unavailable");
    (
        StatusCode::BAD_GATEWAY,
        Json(ApiError::upstream(error.to_string())),
    )
        .into_response()
}

/// Check that a path segment looks like a trading pair symbol.
fn is_symbol(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 32
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}
