//! Resolves the caller of a ranking request.
//!
//! Handlers take `Option<Session>` when an anonymous caller falls back to the
//! default user, and `Session` when only a signed-in user may proceed.

use super::state::ServerState;
use crate::user::AuthTokenValue;

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{debug, warn};

pub const SESSION_COOKIE: &str = "session_token";
pub const SESSION_HEADER: &str = "Authorization";

/// A signed-in user whose vault and ratings the request operates on.
#[derive(Debug)]
pub struct Session {
    pub user_id: usize,
    pub token: String,
}

/// Rejection for handlers that need a signed-in user.
#[derive(Debug)]
pub struct NotSignedIn;

impl IntoResponse for NotSignedIn {
    fn into_response(self) -> Response {
        StatusCode::UNAUTHORIZED.into_response()
    }
}

/// Cookie wins over the header. A `Bearer ` prefix on the header is accepted
/// and stripped.
fn presented_token(parts: &Parts) -> Option<String> {
    let jar = CookieJar::from_headers(&parts.headers);
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        return Some(cookie.value().to_string());
    }
    let header = parts.headers.get(SESSION_HEADER)?;
    let raw = String::from_utf8_lossy(header.as_bytes());
    let token = raw.strip_prefix("Bearer ").unwrap_or(&*raw).trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn resolve(parts: &Parts, state: &ServerState) -> Option<Session> {
    let Some(token) = presented_token(parts) else {
        debug!("Anonymous ranking request");
        return None;
    };
    let value = AuthTokenValue(token);

    let stored = match state.user_manager.get_auth_token(&value) {
        Ok(Some(stored)) => stored,
        Ok(None) => {
            debug!("Unknown session token");
            return None;
        }
        Err(e) => {
            warn!("Session lookup failed: {}", e);
            return None;
        }
    };

    // Best effort, a stale timestamp never blocks a vote.
    if let Err(e) = state.user_manager.update_auth_token_last_used(&value) {
        debug!("Could not touch session {}: {}", stored.user_id, e);
    }

    Some(Session {
        user_id: stored.user_id,
        token: stored.value.0,
    })
}

impl FromRequestParts<ServerState> for Session {
    type Rejection = NotSignedIn;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        resolve(parts, state).ok_or(NotSignedIn)
    }
}

impl FromRequestParts<ServerState> for Option<Session> {
    type Rejection = NotSignedIn;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        Ok(resolve(parts, state))
    }
}
