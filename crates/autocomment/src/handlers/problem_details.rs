//! RFC 7807 problem details responses.

use axum::Json;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub title: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl IntoResponse for ProblemDetails {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (
            status,
            [(header::CONTENT_TYPE, "application/problem+json")],
            Json(self),
        )
            .into_response()
    }
}

pub fn problem(status: StatusCode, detail: impl Into<String>) -> ProblemDetails {
    ProblemDetails {
        kind: "about:blank",
        title: status
            .canonical_reason()
            .unwrap_or("Unknown Error")
            .to_string(),
        status: status.as_u16(),
        detail: Some(detail.into()),
    }
}

pub fn bad_request(detail: impl Into<String>) -> ProblemDetails {
    problem(StatusCode::BAD_REQUEST, detail)
}

pub fn not_found(detail: impl Into<String>) -> ProblemDetails {
    problem(StatusCode::NOT_FOUND, detail)
}

pub fn conflict(detail: impl Into<String>) -> ProblemDetails {
    problem(StatusCode::CONFLICT, detail)
}

pub fn internal_error(detail: impl Into<String>) -> ProblemDetails {
    problem(StatusCode::INTERNAL_SERVER_ERROR, detail)
}

pub fn bad_gateway(detail: impl Into<String>) -> ProblemDetails {
    problem(StatusCode::BAD_GATEWAY, detail)
}

pub fn service_unavailable(detail: impl Into<String>) -> ProblemDetails {
    problem(StatusCode::SERVICE_UNAVAILABLE, detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn renders_problem_json() {
        let response = not_found("account '+1' not found").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/problem+json"
        );

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], 404);
        assert_eq!(json["title"], "Not Found");
        assert_eq!(json["detail"], "account '+1' not found");
    }
}
