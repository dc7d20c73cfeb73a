//! Liveness and readiness probes.

use axum::extract::State;
use axum::http::StatusCode;

use crate::server::AppState;

pub async fn livez() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Ready while the engine loop thread is alive, whether or not sessions run.
pub async fn readyz(State(state): State<AppState>) -> (StatusCode, &'static str) {
    if state.controller.engine().is_loop_alive() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "engine loop stopped")
    }
}
