//! Server administration.

use std::net::SocketAddr;

use axum::Json;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::{info, warn};

use super::{api_auth, problem_details};
use crate::server::AppState;

/// POST /api/admin/v1/shutdown
///
/// Stops accepting requests. The serve command closes every session once the
/// server has drained. Needs the admin token, or a loopback peer when no token
/// is configured.
pub async fn shutdown(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    if !api_auth::is_authorized(state.admin_token.as_deref(), &addr, &headers) {
        warn!(peer = %addr, "Rejected shutdown request");
        return problem_details::problem(StatusCode::FORBIDDEN, "admin access denied")
            .into_response();
    }

    let Some(tx) = state.shutdown_tx.lock().await.take() else {
        return problem_details::conflict("shutdown already in progress").into_response();
    };
    info!(peer = %addr, "Shutdown requested over HTTP");
    let _ = tx.send(());
    Json(json!({ "status": "shutting_down" })).into_response()
}
