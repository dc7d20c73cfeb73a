use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;

use super::control_error;
use crate::api::{CommentRequest, ListCommentsResponse};
use crate::handlers::problem_details;
use crate::server::AppState;

/// GET /api/v1/comments
pub async fn list_comments(State(state): State<AppState>) -> impl IntoResponse {
    match state.controller.registry().comments().await {
        Ok(comments) => Json(ListCommentsResponse { comments }).into_response(),
        Err(e) => control_error(e.into()),
    }
}

/// POST /api/v1/comments
///
/// Takes effect at the next engine start.
pub async fn add_comment(
    State(state): State<AppState>,
    Json(req): Json<CommentRequest>,
) -> impl IntoResponse {
    match state.controller.registry().add_comment(&req.text).await {
        Ok(comments) => (StatusCode::CREATED, Json(ListCommentsResponse { comments }))
            .into_response(),
        Err(e) => control_error(e.into()),
    }
}

/// DELETE /api/v1/comments
///
/// Removes the first comment equal to the given text.
pub async fn remove_comment(
    State(state): State<AppState>,
    Json(req): Json<CommentRequest>,
) -> impl IntoResponse {
    match state.controller.registry().remove_comment(&req.text).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => problem_details::not_found("comment not found").into_response(),
        Err(e) => control_error(e.into()),
    }
}
