use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;

use super::control_error;
use crate::api::StatusResponse;
use crate::server::AppState;

/// GET /api/v1/status
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    match state.controller.status().await {
        Ok(engine) => Json(StatusResponse {
            running: engine.enabled,
            engine,
        })
        .into_response(),
        Err(e) => control_error(e),
    }
}
