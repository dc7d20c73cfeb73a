use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use tokio::sync::{Mutex, oneshot};
use tower_http::timeout::TimeoutLayer;

use crate::control::Controller;
use crate::handlers;

// ============================================================================
// Application State
// ============================================================================

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub controller: Controller,
    pub log_file: PathBuf,
    pub tail_lines: usize,
    pub api_token: Option<String>,
    pub admin_token: Option<String>,
    pub shutdown_tx: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

// ============================================================================
// Server Setup
// ============================================================================

/// Create a shutdown channel pair.
///
/// Returns (sender for AppState, receiver for shutdown_signal).
pub fn shutdown_channel() -> (oneshot::Sender<()>, oneshot::Receiver<()>) {
    oneshot::channel()
}

pub fn build_app(state: AppState, request_timeout_seconds: u64) -> Router {
    let api_v1 = Router::new()
        .route("/status", get(handlers::v1::get_status))
        .route("/accounts", get(handlers::v1::list_accounts))
        .route("/accounts/{phone}", delete(handlers::v1::remove_account))
        .route("/accounts/{phone}/code", post(handlers::v1::request_code))
        .route(
            "/accounts/{phone}/confirm",
            post(handlers::v1::confirm_account),
        )
        .route("/accounts/{phone}/stop", post(handlers::v1::stop_account))
        .route(
            "/comments",
            get(handlers::v1::list_comments)
                .post(handlers::v1::add_comment)
                .delete(handlers::v1::remove_comment),
        )
        .route("/engine/start", post(handlers::v1::start_engine))
        .route("/engine/stop", post(handlers::v1::stop_engine))
        .route("/logs", get(handlers::v1::get_logs))
        .with_state(state.clone())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(request_timeout_seconds),
        ))
        .layer(DefaultBodyLimit::max(64 * 1024))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            handlers::api_auth::require_api_token,
        ));

    // Admin routes (no timeout, state required for shutdown)
    let admin_routes = Router::new()
        .route("/shutdown", post(handlers::shutdown))
        .with_state(state.clone());

    Router::new()
        .route("/livez", get(handlers::livez))
        .route("/readyz", get(handlers::readyz))
        .with_state(state)
        .nest("/api/v1", api_v1)
        .nest("/api/admin/v1", admin_routes)
}
