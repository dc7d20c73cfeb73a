use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;

use super::control_error;
use crate::api::{StartEngineResponse, StopEngineResponse};
use crate::server::AppState;

/// POST /api/v1/engine/start
///
/// Connects every signed-in account. Per-account failures are reported in
/// the body, not as an error status.
pub async fn start_engine(State(state): State<AppState>) -> impl IntoResponse {
    match state.controller.start().await {
        Ok(report) => Json(StartEngineResponse::from(&report)).into_response(),
        Err(e) => control_error(e),
    }
}

/// POST /api/v1/engine/stop
pub async fn stop_engine(State(state): State<AppState>) -> impl IntoResponse {
    match state.controller.stop().await {
        Ok(report) => Json(StopEngineResponse::from(&report)).into_response(),
        Err(e) => control_error(e),
    }
}
