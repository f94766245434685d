//! API authentication via bearer tokens.
//!
//! Each configured token maps to one `Actor` (user, organization, role).
//! The middleware resolves the actor and stores it in the request
//! extensions for handlers to extract.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use pmo_core::access::Actor;
use rand::Rng;

use crate::error::ApiError;
use crate::state::AppState;

/// Generate a random 32-character hex token.
pub fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    hex::encode(bytes)
}

/// Resolve the actor for an `Authorization` header value.
pub fn resolve_actor(state: &AppState, header: Option<&str>) -> Result<Actor, ApiError> {
    let value = header
        .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".to_string()))?;
    let token = value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("Invalid bearer token".to_string()))?;

    state
        .config
        .auth
        .find(token)
        .map(|entry| Actor::new(&entry.user_id, &entry.organization_id, entry.role))
        .ok_or_else(|| ApiError::Unauthorized("Invalid bearer token".to_string()))
}

/// Middleware that validates Bearer token authentication.
///
/// Returns 401 if the header is missing, malformed, or names no configured
/// token; otherwise inserts the resolved `Actor` as a request extension.
pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let header = match req.headers().get("authorization").map(|v| v.to_str()) {
        Some(Ok(s)) => Some(s.to_string()),
        Some(Err(_)) => {
            return ApiError::Unauthorized("Invalid Authorization header encoding".to_string())
                .into_response()
        }
        None => None,
    };

    match resolve_actor(&state, header.as_deref()) {
        Ok(actor) => {
            tracing::debug!(
                user_id = %actor.user_id,
                organization_id = %actor.organization_id,
                role = %actor.role,
                "Request authenticated"
            );
            req.extensions_mut().insert(actor);
            next.run(req).await
        }
        Err(e) => e.into_response(),
    }
}
