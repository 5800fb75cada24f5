//! Integration tests: health, broadcast (app key), channel auth, session and
//! the publish-after-persist actions, over in-memory bus and store.
//!
//! Run with `cargo test`. No Redis or Postgres needed.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use spark_notify::auth::JwtSecret;
use spark_notify::db::{MemberCard, MemoryRecordStore};
use spark_notify::models::event::WsEvent;
use spark_notify::repositories::MemoryPubSub;
use spark_notify::services::AuthService;
use spark_notify::{create_app, AppState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tower::util::ServiceExt;

const APP_KEY: &str = "test-key";
const APP_SECRET: &str = "test-secret";
const JWT: &str = "test-jwt-secret-min-32-chars!!!!";

async fn test_state() -> (AppState, MemoryRecordStore) {
    let store = MemoryRecordStore::new();
    for (id, name, complete) in [("u1", "Ann", true), ("u2", "Bo", true), ("u3", "Cy", false)] {
        store
            .upsert_member(
                MemberCard {
                    user_id: id.to_string(),
                    name: name.to_string(),
                    image: None,
                },
                complete,
            )
            .await;
    }
    let state = AppState::new(
        Arc::new(MemoryPubSub::new()),
        Arc::new(store.clone()),
        None,
        APP_KEY.to_string(),
        APP_SECRET.to_string(),
        JwtSecret::new(JWT.to_string()),
    );
    (state, store)
}

fn token(user_id: &str) -> String {
    JwtSecret::new(JWT.to_string())
        .issue(user_id, chrono::Duration::hours(1))
        .unwrap()
}

fn post_json(uri: &str, user_id: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {}", token(user_id)))
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_as(uri: &str, user_id: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("authorization", format!("Bearer {}", token(user_id)))
        .body(Body::empty())
        .unwrap()
}

async fn call(app: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

async fn next_event(rx: &mut broadcast::Receiver<String>) -> WsEvent {
    let raw = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for event")
        .unwrap();
    serde_json::from_str(&raw).unwrap()
}

/// Skip events still draining from earlier actions.
async fn next_named(rx: &mut broadcast::Receiver<String>, name: &str) -> WsEvent {
    loop {
        let event = next_event(rx).await;
        if event.event == name {
            return event;
        }
    }
}

#[tokio::test]
async fn health_returns_ok() {
    let (state, _) = test_state().await;
    let app = create_app(state);
    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, json) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.get("status").and_then(|v| v.as_str()), Some("ok"));
}

#[tokio::test]
async fn broadcast_requires_app_key() {
    let (state, _) = test_state().await;
    let app = create_app(state);

    let body = serde_json::json!({ "channel": "test-channel", "event": "test", "data": {} });
    let req = Request::builder()
        .method("POST")
        .uri("/api/broadcast")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "broadcast without key should be 401");

    let req = Request::builder()
        .method("POST")
        .uri("/api/broadcast")
        .header("content-type", "application/json")
        .header("x-app-key", APP_KEY)
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, json) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK, "broadcast with valid app_key should succeed");
    assert_eq!(json["channel"], "test-channel");
}

#[tokio::test]
async fn actions_require_bearer_token() {
    let (state, _) = test_state().await;
    let app = create_app(state);
    let req = Request::builder()
        .uri("/api/messages/unread-count")
        .body(Body::empty())
        .unwrap();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = Request::builder()
        .uri("/api/messages/unread-count")
        .header("authorization", "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn channel_auth_only_signs_own_private_channel() {
    let (state, _) = test_state().await;
    let app = create_app(state);

    let req = post_json(
        "/api/channel-auth",
        "u1",
        serde_json::json!({ "socket_id": "1.abc", "channel_name": "private-u2" }),
    );
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let req = post_json(
        "/api/channel-auth",
        "u1",
        serde_json::json!({ "socket_id": "1.abc", "channel_name": "private-u1" }),
    );
    let (status, json) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    let auth = json["auth"].as_str().unwrap();
    AuthService::new(APP_SECRET.to_string())
        .verify_channel_auth("private-u1", "1.abc", Some(auth), None)
        .unwrap();
    assert!(json.get("channel_data").is_none());

    let req = post_json(
        "/api/channel-auth",
        "u1",
        serde_json::json!({ "socket_id": "1.abc", "channel_name": "u1-u2" }),
    );
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn presence_auth_needs_complete_profile() {
    let (state, _) = test_state().await;
    let app = create_app(state);

    let req = post_json(
        "/api/channel-auth",
        "u2",
        serde_json::json!({ "socket_id": "2.xyz", "channel_name": "presence-online" }),
    );
    let (status, json) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    let channel_data = json["channel_data"].as_str().unwrap();
    let parsed: serde_json::Value = serde_json::from_str(channel_data).unwrap();
    assert_eq!(parsed["user_id"], "u2");
    AuthService::new(APP_SECRET.to_string())
        .verify_channel_auth(
            "presence-online",
            "2.xyz",
            json["auth"].as_str(),
            Some(channel_data),
        )
        .unwrap();

    let req = post_json(
        "/api/channel-auth",
        "u3",
        serde_json::json!({ "socket_id": "3.xyz", "channel_name": "presence-online" }),
    );
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let req = post_json(
        "/api/channel-auth",
        "u2",
        serde_json::json!({ "socket_id": "2.xyz", "channel_name": "presence-lobby" }),
    );
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn session_reports_profile_state() {
    let (state, _) = test_state().await;
    let app = create_app(state);
    let (status, json) = call(&app, get_as("/api/session", "u3")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["user_id"], "u3");
    assert_eq!(json["profile_complete"], false);
}

#[tokio::test]
async fn send_message_publishes_to_conversation_and_recipient() {
    let (state, _) = test_state().await;
    let mut conversation = state.channel_service.subscribe("u1-u2").await.unwrap();
    let mut private = state.channel_service.subscribe("private-u2").await.unwrap();
    let app = create_app(state);

    let req = post_json(
        "/api/messages",
        "u1",
        serde_json::json!({ "recipient_id": "u2", "text": "  hey there " }),
    );
    let (status, json) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["text"], "hey there");
    assert_eq!(json["senderName"], "Ann");

    let on_thread = next_event(&mut conversation).await;
    assert_eq!(on_thread.event, "message:new");
    assert_eq!(on_thread.data["id"], json["id"]);
    let on_private = next_event(&mut private).await;
    assert_eq!(on_private.event, "message:new");
    assert_eq!(on_private.channel.as_deref(), Some("private-u2"));

    let (status, json) = call(&app, get_as("/api/messages/unread-count", "u2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 1);
}

#[tokio::test]
async fn blank_or_self_message_is_rejected() {
    let (state, _) = test_state().await;
    let app = create_app(state);

    let req = post_json(
        "/api/messages",
        "u1",
        serde_json::json!({ "recipient_id": "u2", "text": "   " }),
    );
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let req = post_json(
        "/api/messages",
        "u1",
        serde_json::json!({ "recipient_id": "u1", "text": "me" }),
    );
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn mutual_like_notifies_both_sides() {
    let (state, _) = test_state().await;
    let mut to_u1 = state.channel_service.subscribe("private-u1").await.unwrap();
    let mut to_u2 = state.channel_service.subscribe("private-u2").await.unwrap();
    let app = create_app(state);

    let (status, json) = call(&app, post_json("/api/likes", "u1", serde_json::json!({ "target_id": "u2" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["is_match"], false);
    let like = next_event(&mut to_u2).await;
    assert_eq!(like.event, "like:new");
    assert_eq!(like.data["name"], "Ann");

    let (_, json) = call(&app, post_json("/api/likes", "u2", serde_json::json!({ "target_id": "u1" }))).await;
    assert_eq!(json["is_match"], true);
    assert_eq!(next_event(&mut to_u1).await.event, "like:new");
    let matched = next_event(&mut to_u1).await;
    assert_eq!(matched.event, "match:new");
    assert_eq!(matched.data["name"], "Bo");
    let matched = next_event(&mut to_u2).await;
    assert_eq!(matched.event, "match:new");
    assert_eq!(matched.data["name"], "Ann");

    // Repeat like: nothing new to announce.
    let (_, json) = call(&app, post_json("/api/likes", "u1", serde_json::json!({ "target_id": "u2" }))).await;
    assert_eq!(json["message"], "Already liked");
    assert!(tokio::time::timeout(Duration::from_millis(200), to_u2.recv()).await.is_err());
}

#[tokio::test]
async fn reading_a_thread_publishes_receipts() {
    let (state, store) = test_state().await;
    let app = create_app(state.clone());
    for text in ["one", "two"] {
        let req = post_json(
            "/api/messages",
            "u1",
            serde_json::json!({ "recipient_id": "u2", "text": text }),
        );
        assert_eq!(call(&app, req).await.0, StatusCode::OK);
    }
    let hidden = post_json(
        "/api/messages",
        "u1",
        serde_json::json!({ "recipient_id": "u2", "text": "three" }),
    );
    let (_, hidden) = call(&app, hidden).await;
    store
        .delete_for_recipient(hidden["id"].as_str().unwrap())
        .await;
    let (_, json) = call(&app, get_as("/api/messages/unread-count", "u2")).await;
    assert_eq!(json["count"], 2);

    let mut conversation = state.channel_service.subscribe("u1-u2").await.unwrap();
    let (status, receipt) = call(&app, post_json("/api/threads/u1/read", "u2", serde_json::json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["read_count"], 2);

    let event = next_named(&mut conversation, "messages:read").await;
    assert_eq!(event.data, receipt["message_ids"]);

    let (_, json) = call(&app, get_as("/api/messages/unread-count", "u2")).await;
    assert_eq!(json["count"], 0);

    // Nothing left to mark: no receipt published.
    let (_, receipt) = call(&app, post_json("/api/threads/u1/read", "u2", serde_json::json!({}))).await;
    assert_eq!(receipt["read_count"], 0);
    assert!(tokio::time::timeout(Duration::from_millis(200), conversation.recv()).await.is_err());
}
