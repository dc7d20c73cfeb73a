//! Account sign-in and removal handlers.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use super::control_error;
use crate::api::{AccountActionResponse, ConfirmAccountRequest, ListAccountsResponse};
use crate::control::Confirmation;
use crate::handlers::problem_details;
use crate::server::AppState;

fn action(phone: String, status: &str) -> Json<AccountActionResponse> {
    Json(AccountActionResponse {
        phone,
        status: status.to_string(),
    })
}

/// GET /api/v1/accounts
pub async fn list_accounts(State(state): State<AppState>) -> impl IntoResponse {
    match state.controller.accounts().await {
        Ok(snapshot) => Json(ListAccountsResponse::from(&snapshot)).into_response(),
        Err(e) => control_error(e),
    }
}

/// POST /api/v1/accounts/{phone}/code
pub async fn request_code(
    State(state): State<AppState>,
    Path(phone): Path<String>,
) -> impl IntoResponse {
    match state.controller.request_code(&phone).await {
        Ok(()) => (StatusCode::ACCEPTED, action(phone, "code_sent")).into_response(),
        Err(e) => control_error(e),
    }
}

/// POST /api/v1/accounts/{phone}/confirm
pub async fn confirm_account(
    State(state): State<AppState>,
    Path(phone): Path<String>,
    Json(req): Json<ConfirmAccountRequest>,
) -> impl IntoResponse {
    if req.code.trim().is_empty() {
        return problem_details::bad_request("code must not be empty").into_response();
    }

    match state
        .controller
        .confirm(&phone, req.code.trim(), req.password.as_deref())
        .await
    {
        Ok(Confirmation::SignedIn) => action(phone, "signed_in").into_response(),
        Ok(Confirmation::NotAuthorized) => {
            problem_details::bad_request(format!("sign-in for '{phone}' was not completed"))
                .into_response()
        }
        Err(e) => control_error(e),
    }
}

/// POST /api/v1/accounts/{phone}/stop
pub async fn stop_account(
    State(state): State<AppState>,
    Path(phone): Path<String>,
) -> impl IntoResponse {
    match state.controller.stop_account(&phone).await {
        Ok(true) => action(phone, "stopped").into_response(),
        Ok(false) => problem_details::not_found(format!("no live session for '{phone}'"))
            .into_response(),
        Err(e) => control_error(e),
    }
}

/// DELETE /api/v1/accounts/{phone}
pub async fn remove_account(
    State(state): State<AppState>,
    Path(phone): Path<String>,
) -> impl IntoResponse {
    match state.controller.remove_account(&phone).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => {
            problem_details::not_found(format!("account '{phone}' not found")).into_response()
        }
        Err(e) => control_error(e),
    }
}
