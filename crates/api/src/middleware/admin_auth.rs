//! Shared-key guard for the admin routes.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use shared::crypto::digests_match;

use crate::app::AppState;
use crate::error::ApiError;

/// Header carrying the admin key.
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Rejects requests whose `X-Admin-Key` does not match the configured key.
/// An empty configured key disables the admin API entirely.
pub async fn require_admin_key(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let expected = state.config.security.admin_api_key.as_str();
    if expected.is_empty() {
        return ApiError::Unauthorized("Admin API is disabled".to_string()).into_response();
    }

    let provided = req
        .headers()
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if provided.is_empty() {
        return ApiError::Unauthorized("Missing admin key".to_string()).into_response();
    }
    if !digests_match(provided, expected) {
        tracing::warn!(path = %req.uri().path(), "Rejected admin request with invalid key");
        return ApiError::Unauthorized("Invalid admin key".to_string()).into_response();
    }

    next.run(req).await
}
