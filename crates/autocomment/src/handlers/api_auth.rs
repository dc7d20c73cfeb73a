//! Bearer token checks for the operator API and admin routes.
//!
//! With a token configured every request must carry it as
//! `Authorization: Bearer <token>`. Without one only loopback peers get in.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::problem_details;
use crate::server::AppState;

/// Token comparison hashes both sides with SHA-256 first.
pub fn is_authorized(token: Option<&str>, addr: &SocketAddr, headers: &HeaderMap) -> bool {
    match token {
        Some(expected) => headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|provided| {
                Sha256::digest(provided.as_bytes()) == Sha256::digest(expected.as_bytes())
            }),
        None => addr.ip().is_loopback(),
    }
}

/// Middleware that guards `/api/v1/*`.
pub async fn require_api_token(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    if !is_authorized(state.api_token.as_deref(), &addr, request.headers()) {
        debug!(peer = %addr, path = %request.uri().path(), "Unauthorized API request");
        return problem_details::problem(StatusCode::UNAUTHORIZED, "missing or invalid API token")
            .into_response();
    }
    next.run(request).await
}
