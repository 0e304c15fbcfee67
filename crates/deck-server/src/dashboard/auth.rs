//! Session-cookie authentication for the dashboard API.
//!
//! The middleware maps every failure to the same generic 401 body; the
//! precise reason (unknown vs expired) is logged but never surfaced, so the
//! boundary leaks no session-existence information.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::session::SessionError;

use super::routes::ApiError;
use super::server::AppState;

/// Authenticated identity attached to the request by the middleware.
#[derive(Debug, Clone)]
pub struct AuthedUser {
    /// Wallet address bound to the session.
    pub address: String,
    /// The session id the request authenticated with.
    pub session_id: String,
}

/// Require a valid session cookie; the single choke point for protected
/// routes.
pub async fn require_session(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(cookie) = jar.get(&state.config.session.cookie_name) else {
        return unauthorized();
    };

    match state.sessions.verify(cookie.value()).await {
        Ok(session) => {
            request.extensions_mut().insert(AuthedUser {
                address: session.address,
                session_id: session.session_id,
            });
            next.run(request).await
        }
        Err(reason @ (SessionError::NotFound | SessionError::Expired)) => {
            // Reason stays in the logs; the client sees a generic rejection.
            debug!(reason = %reason, "Session verification rejected");
            unauthorized()
        }
        Err(SessionError::Store(e)) => {
            error!(error = %e, "Session store unavailable during verification");
            server_error()
        }
    }
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(ApiError::unauthorized())).into_response()
}

fn server_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiError::internal("session service unavailable")),
    )
        .into_response()
}

// ============================================================================
// Auth routes
// ============================================================================

/// Login request body. The address arrives already proven by the identity
/// layer in front of this service; this core only binds it to a session.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub address: String,
}

/// Login response body.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub address: String,
    pub expires_at: DateTime<Utc>,
}

/// Logout response body.
#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub logged_out: bool,
}

/// Current-session response body.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub address: String,
}

/// POST /api/auth/login - create a session and set the session cookie.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), (StatusCode, Json<ApiError>)> {
    if !is_wallet_address(&body.address) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError::bad_request("invalid wallet address")),
        ));
    }

    let address = body.address.to_lowercase();
    let session = state.sessions.create(&address).await.map_err(|e| {
        error!(error = %e, "Failed to create session");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiError::internal("session service unavailable")),
        )
    })?;

    let cookie = session_cookie(
        &state.config.session.cookie_name,
        &session.session_id,
        state.config.session.ttl_secs,
        state.config.session.cookie_secure,
    );

    Ok((
        jar.add(cookie),
        Json(LoginResponse {
            address: session.address,
            expires_at: session.expires_at,
        }),
    ))
}

/// POST /api/auth/logout - invalidate the session and clear the cookie.
///
/// Deliberately outside the auth middleware: logging out with an expired or
/// unknown cookie still succeeds and clears it.
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<LogoutResponse>), (StatusCode, Json<ApiError>)> {
    if let Some(cookie) = jar.get(&state.config.session.cookie_name) {
        state.sessions.invalidate(cookie.value()).await.map_err(|e| {
            error!(error = %e, "Failed to invalidate session");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError::internal("session service unavailable")),
            )
        })?;
    }

    let jar = jar.add(clear_session_cookie(&state.config.session.cookie_name));
    Ok((jar, Json(LogoutResponse { logged_out: true })))
}

/// GET /api/auth/session - echo the authenticated identity.
pub async fn current_session(Extension(user): Extension<AuthedUser>) -> Json<SessionResponse> {
    Json(SessionResponse {
        address: user.address,
    })
}

// ============================================================================
// Cookie helpers
// ============================================================================

/// Create the session cookie.
fn session_cookie(name: &str, session_id: &str, ttl_secs: u64, secure: bool) -> Cookie<'static> {
    Cookie::build((name.to_string(), session_id.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/".to_string())
        .max_age(time::Duration::seconds(ttl_secs as i64))
        .build()
}

/// Create the removal cookie for the session.
fn clear_session_cookie(name: &str) -> Cookie<'static> {
    Cookie::build((name.to_string(), ""))
        .http_only(true)
        .path("/".to_string())
        .max_age(time::Duration::ZERO)
        .build()
}

/// Check that a string looks like a chain address: 0x + 40 hex digits.
fn is_wallet_address(s: &str) -> bool {
    s.len() == 42 && s.starts_with("0x") && s[2..].bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_address_accepts_checksummed_and_lowercase() {
        assert!(is_wallet_address(
            "0xAb5801a7D398351b8bE11C439e05C5b3259aeC9B"
        ));
        assert!(is_wallet_address(
            "0xab5801a7d398351b8be11c439e05c5b3259aec9b"
        ));
    }

    #[test]
    fn test_wallet_address_rejects_malformed() {
        assert!(!is_wallet_address(""));
        assert!(!is_wallet_address("0x1234"));
        assert!(!is_wallet_address(
            "ab5801a7d398351b8be11c439e05c5b3259aec9bab"
        ));
        assert!(!is_wallet_address(
            "0xZZ5801a7d398351b8be11c439e05c5b3259aec9b"
        ));
    }

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = session_cookie("deck_session", "abc123", 3600, true);
        assert_eq!(cookie.name(), "deck_session");
        assert_eq!(cookie.value(), "abc123");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.max_age(), Some(time::Duration::seconds(3600)));
    }

    #[test]
    fn test_clear_cookie_expires_immediately() {
        let cookie = clear_session_cookie("deck_session");
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(time::Duration::ZERO));
    }
}
