use axum::Json;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use tracing::error;

use crate::api::{LogsQuery, LogsResponse};
use crate::handlers::problem_details;
use crate::logging;
use crate::server::AppState;

/// GET /api/v1/logs?lines=N
pub async fn get_logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> impl IntoResponse {
    let lines = query.lines.unwrap_or(state.tail_lines);
    match logging::tail(&state.log_file, lines).await {
        Ok(lines) => Json(LogsResponse { lines }).into_response(),
        Err(e) => {
            error!(path = %state.log_file.display(), error = %e, "Failed to read log file");
            problem_details::internal_error("failed to read log file").into_response()
        }
    }
}
