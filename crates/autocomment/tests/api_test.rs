//! Integration tests for the HTTP API.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

mod common;

use autocomment::connector::ChatKind;
use common::{Behavior, TestContext, test_context, wait_for};

// ============================================================================
// Helpers
// ============================================================================

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()))
    };
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str) -> Request<Body> {
    Request::post(uri).body(Body::empty()).unwrap()
}

fn with_json(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn signed_in(ctx: &TestContext, phone: &str) {
    ctx.registry().mark_signed_in(phone).await.unwrap();
}

async fn add_comment(ctx: &TestContext, text: &str) {
    ctx.registry().add_comment(text).await.unwrap();
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_livez() {
    let ctx = test_context();
    let (status, body) = send(ctx.app(), get("/livez")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".to_string()));
}

#[tokio::test]
async fn test_readyz_follows_engine_loop() {
    let ctx = test_context();
    let (status, _) = send(ctx.app(), get("/readyz")).await;
    assert_eq!(status, StatusCode::OK);

    ctx.engine().shutdown().await;
    let (status, _) = send(ctx.app(), get("/readyz")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_status_when_stopped() {
    let ctx = test_context();
    let (status, body) = send(ctx.app(), get("/api/v1/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["running"], false);
    assert_eq!(body["phase"], "stopped");
    assert_eq!(body["sessions"], json!([]));
}

// ============================================================================
// Accounts
// ============================================================================

#[tokio::test]
async fn test_sign_in_flow() {
    let ctx = test_context();

    let (status, body) = send(ctx.app(), post("/api/v1/accounts/+15550100/code")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "code_sent");

    let (_, body) = send(ctx.app(), get("/api/v1/accounts")).await;
    assert_eq!(
        body["accounts"],
        json!([{"phone": "+15550100", "signed_in": false, "code_pending": true}])
    );

    // Wrong code
    let (status, body) = send(
        ctx.app(),
        with_json("POST", "/api/v1/accounts/+15550100/confirm", json!({"code": "00000"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);

    let (status, body) = send(
        ctx.app(),
        with_json("POST", "/api/v1/accounts/+15550100/confirm", json!({"code": "12345"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "signed_in");

    let (_, body) = send(ctx.app(), get("/api/v1/accounts")).await;
    assert_eq!(body["accounts"][0]["signed_in"], true);
    assert_eq!(body["accounts"][0]["code_pending"], false);

    // Already signed in
    let (status, _) = send(ctx.app(), post("/api/v1/accounts/+15550100/code")).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_confirm_without_code_request() {
    let ctx = test_context();
    let (status, body) = send(
        ctx.app(),
        with_json("POST", "/api/v1/accounts/+1/confirm", json!({"code": "12345"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("no verification code"));
}

#[tokio::test]
async fn test_confirm_with_second_factor() {
    let ctx = test_context();
    send(ctx.app(), post("/api/v1/accounts/+1/code")).await;

    let (status, body) = send(
        ctx.app(),
        with_json("POST", "/api/v1/accounts/+1/confirm", json!({"code": "22222"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("second-factor"));

    let (status, _) = send(
        ctx.app(),
        with_json(
            "POST",
            "/api/v1/accounts/+1/confirm",
            json!({"code": "22222", "password": "hunter2"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_request_code_unreachable() {
    let ctx = test_context();
    ctx.connector.set("+1", Behavior::Unreachable);
    let (status, _) = send(ctx.app(), post("/api/v1/accounts/+1/code")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_remove_account_stops_session() {
    let ctx = test_context();
    signed_in(&ctx, "+1").await;
    add_comment(&ctx, "hi").await;
    send(ctx.app(), post("/api/v1/engine/start")).await;

    let (status, _) = send(ctx.app(), Request::delete("/api/v1/accounts/+1").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(ctx.connector.closed(), vec!["+1"]);
    assert!(ctx.registry().snapshot().await.unwrap().accounts.is_empty());

    let (status, _) = send(ctx.app(), Request::delete("/api/v1/accounts/+1").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_account_key_must_be_phone_number() {
    let ctx = test_context();
    let sessions = ctx.registry().sessions_dir().to_path_buf();
    let victim = sessions.parent().unwrap().join("victim.session");
    std::fs::write(&victim, b"keep").unwrap();

    let (status, body) = send(
        ctx.app(),
        Request::delete("/api/v1/accounts/..%2Fvictim").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("../victim"));
    assert!(victim.exists());

    let (status, _) = send(ctx.app(), post("/api/v1/accounts/abc/code")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(ctx.connector.connects().is_empty());
}

#[tokio::test]
async fn test_stop_account() {
    let ctx = test_context();
    signed_in(&ctx, "+1").await;
    signed_in(&ctx, "+2").await;
    add_comment(&ctx, "hi").await;

    let (status, _) = send(ctx.app(), post("/api/v1/accounts/+1/stop")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    send(ctx.app(), post("/api/v1/engine/start")).await;
    let (status, body) = send(ctx.app(), post("/api/v1/accounts/+1/stop")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "stopped");

    let (_, body) = send(ctx.app(), get("/api/v1/status")).await;
    assert_eq!(body["running"], true);
    assert_eq!(body["sessions"], json!([{"account": "+2", "healthy": true}]));
}

// ============================================================================
// Comments
// ============================================================================

#[tokio::test]
async fn test_comment_crud() {
    let ctx = test_context();

    let (status, body) = send(
        ctx.app(),
        with_json("POST", "/api/v1/comments", json!({"text": "Nice!"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["comments"], json!(["Nice!"]));

    send(
        ctx.app(),
        with_json("POST", "/api/v1/comments", json!({"text": "Thanks"})),
    )
    .await;

    let (status, _) = send(
        ctx.app(),
        with_json("POST", "/api/v1/comments", json!({"text": "   "})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        ctx.app(),
        with_json("DELETE", "/api/v1/comments", json!({"text": "Nice!"})),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(
        ctx.app(),
        with_json("DELETE", "/api/v1/comments", json!({"text": "Nice!"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send(ctx.app(), get("/api/v1/comments")).await;
    assert_eq!(body["comments"], json!(["Thanks"]));
}

// ============================================================================
// Engine
// ============================================================================

#[tokio::test]
async fn test_start_requires_accounts_and_comments() {
    let ctx = test_context();

    let (status, _) = send(ctx.app(), post("/api/v1/engine/start")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    add_comment(&ctx, "hi").await;
    let (status, _) = send(ctx.app(), post("/api/v1/engine/start")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Known but not signed in
    send(ctx.app(), post("/api/v1/accounts/+1/code")).await;
    let (status, body) = send(ctx.app(), post("/api/v1/engine/start")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("signed in"));
    assert!(ctx.connector.connects().is_empty());
}

#[tokio::test]
async fn test_start_and_stop_engine() {
    let ctx = test_context();
    signed_in(&ctx, "+1").await;
    signed_in(&ctx, "+2").await;
    add_comment(&ctx, "Great post!").await;
    ctx.connector.set("+2", Behavior::Unauthorized);

    let (status, body) = send(ctx.app(), post("/api/v1/engine/start")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["started"], json!(["+1"]));
    assert_eq!(body["failed"][0]["phone"], "+2");
    assert_eq!(body["failed"][0]["code"], "auth_required");

    let (status, _) = send(ctx.app(), post("/api/v1/engine/start")).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = send(ctx.app(), get("/api/v1/status")).await;
    assert_eq!(body["running"], true);
    assert_eq!(body["phase"], "running");

    assert!(ctx.connector.post("+1", ChatKind::Broadcast, 7).await);
    assert!(wait_for(|| ctx.connector.sent().len() == 1).await);
    assert_eq!(ctx.connector.sent()[0].content, "Great post!");

    let (status, body) = send(ctx.app(), post("/api/v1/engine/stop")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["closed"], json!(["+1"]));

    let (_, body) = send(ctx.app(), get("/api/v1/status")).await;
    assert_eq!(body["running"], false);
}

#[tokio::test]
async fn test_comment_changes_apply_at_next_start() {
    let ctx = test_context();
    signed_in(&ctx, "+1").await;
    add_comment(&ctx, "old").await;
    send(ctx.app(), post("/api/v1/engine/start")).await;

    send(
        ctx.app(),
        with_json("DELETE", "/api/v1/comments", json!({"text": "old"})),
    )
    .await;
    add_comment(&ctx, "new").await;

    ctx.connector.post("+1", ChatKind::Broadcast, 1).await;
    assert!(wait_for(|| ctx.connector.sent().len() == 1).await);
    assert_eq!(ctx.connector.sent()[0].content, "old");

    send(ctx.app(), post("/api/v1/engine/stop")).await;
    send(ctx.app(), post("/api/v1/engine/start")).await;
    ctx.connector.post("+1", ChatKind::Broadcast, 2).await;
    assert!(wait_for(|| ctx.connector.sent().len() == 2).await);
    assert_eq!(ctx.connector.sent()[1].content, "new");
}

// ============================================================================
// Logs
// ============================================================================

#[tokio::test]
async fn test_logs_tail() {
    let ctx = test_context();

    let (status, body) = send(ctx.app(), get("/api/v1/logs")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["lines"], json!([]));

    tokio::fs::write(&ctx.state.log_file, "a\nb\nc\n").await.unwrap();
    let (status, body) = send(ctx.app(), get("/api/v1/logs?lines=2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["lines"], json!(["b", "c"]));
}

// ============================================================================
// Auth
// ============================================================================

#[tokio::test]
async fn test_remote_requests_need_a_token() {
    let ctx = test_context();
    let (status, _) = send(ctx.remote_app(), get("/api/v1/status")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Health stays open
    let (status, _) = send(ctx.remote_app(), get("/livez")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_api_token() {
    let mut ctx = test_context();
    ctx.state.api_token = Some("s3cret".to_string());

    let (status, _) = send(ctx.remote_app(), get("/api/v1/status")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::get("/api/v1/status")
        .header(header::AUTHORIZATION, "Bearer s3cret")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(ctx.remote_app(), request).await;
    assert_eq!(status, StatusCode::OK);
}

// ============================================================================
// Admin
// ============================================================================

#[tokio::test]
async fn test_admin_shutdown() {
    let ctx = test_context();

    let (status, _) = send(ctx.remote_app(), post("/api/admin/v1/shutdown")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(ctx.app(), post("/api/admin/v1/shutdown")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "shutting_down");

    let (status, _) = send(ctx.app(), post("/api/admin/v1/shutdown")).await;
    assert_eq!(status, StatusCode::CONFLICT);
}
