//! Router-level tests: the HTTP shell over the message state engine.

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use jsonwebtoken::{EncodingKey, Header};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use parley_api::auth::AppStateInner;
use parley_db::Database;
use parley_types::api::Claims;

// Matches the middleware fallback used when PARLEY_JWT_SECRET is unset.
const SECRET: &str = "dev-secret-change-me";

fn test_app(dir: &tempfile::TempDir) -> Router {
    let db = Database::open(&dir.path().join("test.db")).unwrap();
    parley_api::router(Arc::new(AppStateInner {
        db,
        jwt_secret: SECRET.to_string(),
        presence_window: chrono::Duration::seconds(60),
    }))
}

fn token_for(username: &str) -> String {
    let claims = Claims {
        sub: Uuid::new_v4(),
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as usize,
    };
    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn post_empty(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

fn get_req(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn send_message(app: &Router, token: &str, room: &str, content: &str) -> Value {
    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/rooms/{room}/messages"),
            Some(token),
            json!({ "content": content }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await
}

#[tokio::test]
async fn mutation_without_token_is_unauthorized() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);

    let uri = format!("/api/messages/{}/read", Uuid::new_v4());
    let response = app
        .clone()
        .oneshot(Request::builder().method("POST").uri(&uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn mark_read_unknown_message_is_404() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);

    let uri = format!("/api/messages/{}/read", Uuid::new_v4());
    let response = app
        .clone()
        .oneshot(post_empty(&uri, &token_for("alice")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = body_json(response).await;
    assert!(body.get("error").is_some());
}

#[tokio::test]
async fn react_toggle_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);

    let msg = send_message(&app, &token_for("bob"), "r1", "hello").await;
    let uri = format!("/api/messages/{}/reactions", msg["id"].as_str().unwrap());

    // alice reacts
    let response = app
        .clone()
        .oneshot(post_json(&uri, Some(&token_for("alice")), json!({ "emoji": "😊" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["reactions"]["😊"], json!(["alice"]));

    // bob joins in
    let response = app
        .clone()
        .oneshot(post_json(&uri, Some(&token_for("bob")), json!({ "emoji": "😊" })))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["reactions"]["😊"], json!(["alice", "bob"]));

    // alice un-reacts, bob remains
    let response = app
        .clone()
        .oneshot(post_json(&uri, Some(&token_for("alice")), json!({ "emoji": "😊" })))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["reactions"]["😊"], json!(["bob"]));

    // bob un-reacts: the emoji key disappears entirely
    let response = app
        .clone()
        .oneshot(post_json(&uri, Some(&token_for("bob")), json!({ "emoji": "😊" })))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["reactions"], json!({}));
}

#[tokio::test]
async fn room_history_is_ascending_with_state() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);
    let bob = token_for("bob");

    let first = send_message(&app, &bob, "r1", "first").await;
    send_message(&app, &bob, "r1", "second").await;

    // mark the first message read by alice
    let uri = format!("/api/messages/{}/read", first["id"].as_str().unwrap());
    let response = app
        .clone()
        .oneshot(post_empty(&uri, &token_for("alice")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], json!(true));

    let response = app
        .clone()
        .oneshot(get_req("/api/rooms/r1/messages", &bob))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let messages = body.as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["content"], json!("first"));
    assert_eq!(messages[1]["content"], json!("second"));
    assert_eq!(messages[0]["read_by"], json!(["alice"]));
    assert_eq!(messages[1]["read_by"], json!([]));
    assert_eq!(messages[0]["delivered"], json!(false));
    assert_eq!(messages[0]["failed"], json!(false));
}

#[tokio::test]
async fn empty_content_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);

    let msg = send_message(&app, &token_for("bob"), "r1", "").await;
    assert_eq!(msg["content"], json!(""));
    assert_eq!(msg["sender"], json!("bob"));
}

#[tokio::test]
async fn conversation_sweep_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);
    let alice = token_for("alice");

    send_message(&app, &alice, "r1", "one").await;
    send_message(&app, &alice, "r2", "two").await;

    let response = app
        .clone()
        .oneshot(post_empty("/api/conversations/alice/read", &token_for("bob")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], json!("success"));
    assert_eq!(body["updated"], json!(2));

    let response = app
        .clone()
        .oneshot(post_empty("/api/conversations/alice/read", &token_for("bob")))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["updated"], json!(0));
}

#[tokio::test]
async fn delivery_setter_flips_flags() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);
    let bob = token_for("bob");

    let msg = send_message(&app, &bob, "r1", "hi").await;
    let uri = format!("/api/messages/{}/delivery", msg["id"].as_str().unwrap());

    let response = app
        .clone()
        .oneshot(post_json(&uri, Some(&bob), json!({ "delivered": true, "failed": false })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(get_req("/api/rooms/r1/messages", &bob))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body[0]["delivered"], json!(true));
    assert_eq!(body[0]["failed"], json!(false));
}

#[tokio::test]
async fn room_users_report_presence_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);

    send_message(&app, &token_for("alice"), "r1", "hi").await;
    send_message(&app, &token_for("bob"), "r1", "hello").await;
    send_message(&app, &token_for("carol"), "elsewhere", "other room").await;

    let response = app
        .clone()
        .oneshot(get_req("/api/rooms/r1/users", &token_for("alice")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let users = body.as_array().unwrap();

    assert_eq!(users.len(), 2);
    assert_eq!(users[0]["username"], json!("bob"));
    assert_eq!(users[1]["username"], json!("alice"));
    // Both just spoke, so both are inside the liveness window.
    assert_eq!(users[0]["status"], json!("online"));
    assert_eq!(users[1]["status"], json!("online"));
    assert!(users[0]["lastSeen"].as_str().is_some());
}

#[tokio::test]
async fn register_login_and_use_token() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);

    let response = app
        .clone()
        .oneshot(post_json(
            "/auth/register",
            None,
            json!({ "username": "dave", "password": "hunter2hunter2" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(post_json(
            "/auth/login",
            None,
            json!({ "username": "dave", "password": "hunter2hunter2" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let token = body["token"].as_str().unwrap().to_string();

    let msg = send_message(&app, &token, "r1", "logged in").await;
    assert_eq!(msg["sender"], json!("dave"));
}
