//! Client scenarios against a live server on a loopback port: the websocket
//! transport, channel authorization, dispatcher, roster and thread binding.

use axum::Router;
use serde_json::json;
use spark_notify::auth::JwtSecret;
use spark_notify::client::testing::RecordingUi;
use spark_notify::client::{
    ActiveView, BusClient, ChatThread, ClientConfig, ClientStores, NotificationSession,
    SessionInfo, WsTransport,
};
use spark_notify::db::{MemberCard, MemoryRecordStore};
use spark_notify::models::notification::MessageDto;
use spark_notify::repositories::MemoryPubSub;
use spark_notify::{create_app, AppState};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const JWT: &str = "client-test-jwt-secret-32-chars!";

async fn serve() -> SocketAddr {
    let store = MemoryRecordStore::new();
    for (id, name) in [("u1", "Ann"), ("u2", "Bo")] {
        store
            .upsert_member(
                MemberCard {
                    user_id: id.to_string(),
                    name: name.to_string(),
                    image: None,
                },
                true,
            )
            .await;
    }
    let state = AppState::new(
        Arc::new(MemoryPubSub::new()),
        Arc::new(store),
        None,
        "key".to_string(),
        "secret".to_string(),
        JwtSecret::new(JWT.to_string()),
    );
    let app: Router = create_app(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn token(user_id: &str) -> String {
    JwtSecret::new(JWT.to_string())
        .issue(user_id, chrono::Duration::hours(1))
        .unwrap()
}

fn config(addr: SocketAddr, user_id: &str) -> ClientConfig {
    ClientConfig {
        ws_url: format!("ws://{}/ws", addr),
        api_url: format!("http://{}", addr),
        token: token(user_id),
        reconnect_delay: Duration::from_secs(1),
    }
}

fn signed_in(user_id: &str) -> SessionInfo {
    SessionInfo {
        user_id: Some(user_id.to_string()),
        profile_complete: true,
    }
}

async fn wait_until(what: &str, check: impl Fn() -> bool) {
    for _ in 0..250 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {}", what);
}

async fn post_as(addr: SocketAddr, user_id: &str, path: &str, body: serde_json::Value) -> serde_json::Value {
    reqwest::Client::new()
        .post(format!("http://{}{}", addr, path))
        .bearer_auth(token(user_id))
        .json(&body)
        .send()
        .await
        .unwrap()
        .error_for_status()
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn message_reaches_recipient_dispatcher() {
    let addr = serve().await;
    let bus = BusClient::new();
    let _transport = WsTransport::connect(config(addr, "u2"), &bus).unwrap();
    let ui = RecordingUi::new(ActiveView::Messages);
    let session = NotificationSession::start(&bus, &signed_in("u2"), ClientStores::default(), ui.clone());

    // Presence is joined after the private channel, so once the roster has
    // synced both subscriptions are live.
    wait_until("roster sync", || session.is_online("u2")).await;

    post_as(addr, "u1", "/api/messages", json!({ "recipient_id": "u2", "text": "hi Bo" })).await;

    let unread = session.stores().unread.clone();
    wait_until("unread bump", || unread.get() == 1).await;
    assert_eq!(ui.toasts()[0].text, "New message from Ann");
    assert_eq!(ui.refreshes(), 1);
}

#[tokio::test]
async fn roster_tracks_other_users_coming_and_going() {
    let addr = serve().await;

    let bus_b = BusClient::new();
    let _transport_b = WsTransport::connect(config(addr, "u2"), &bus_b).unwrap();
    let session_b = NotificationSession::start(
        &bus_b,
        &signed_in("u2"),
        ClientStores::default(),
        RecordingUi::new(ActiveView::Other),
    );
    wait_until("u2 synced", || session_b.is_online("u2")).await;
    assert!(!session_b.is_online("u1"));

    let bus_a = BusClient::new();
    let transport_a = WsTransport::connect(config(addr, "u1"), &bus_a).unwrap();
    let session_a = NotificationSession::start(
        &bus_a,
        &signed_in("u1"),
        ClientStores::default(),
        RecordingUi::new(ActiveView::Other),
    );
    wait_until("u1 sees u2", || session_a.is_online("u2")).await;
    wait_until("u2 sees u1", || session_b.is_online("u1")).await;

    // u1 closes the tab.
    session_a.end();
    bus_a.detach_transport();
    drop(transport_a);
    wait_until("u1 gone", || !session_b.is_online("u1")).await;
    assert!(session_b.is_online("u2"));
}

#[tokio::test]
async fn foreign_private_channel_is_refused() {
    let addr = serve().await;
    let bus = BusClient::new();
    let _transport = WsTransport::connect(config(addr, "u1"), &bus).unwrap();

    let refused = Arc::new(AtomicBool::new(false));
    let mut handle = bus.subscribe("private-u2");
    let r = refused.clone();
    handle.bind("pusher:subscription_error", move |_| r.store(true, Ordering::SeqCst));
    let delivered = Arc::new(AtomicBool::new(false));
    let d = delivered.clone();
    handle.bind("message:new", move |_| d.store(true, Ordering::SeqCst));

    wait_until("refusal", || refused.load(Ordering::SeqCst)).await;

    post_as(addr, "u1", "/api/messages", json!({ "recipient_id": "u2", "text": "hello" })).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!delivered.load(Ordering::SeqCst));
}

#[tokio::test]
async fn read_receipts_update_open_thread() {
    let addr = serve().await;

    let first = post_as(addr, "u1", "/api/messages", json!({ "recipient_id": "u2", "text": "one" })).await;
    let second = post_as(addr, "u1", "/api/messages", json!({ "recipient_id": "u2", "text": "two" })).await;
    let initial: Vec<MessageDto> = vec![
        serde_json::from_value(first).unwrap(),
        serde_json::from_value(second).unwrap(),
    ];

    let bus = BusClient::new();
    let _transport = WsTransport::connect(config(addr, "u1"), &bus).unwrap();
    let ui = RecordingUi::new(ActiveView::Other);
    let thread = ChatThread::open(&bus, "u1", "u2", initial, ui.clone());
    assert_eq!(thread.channel(), "u1-u2");

    let joined = Arc::new(AtomicBool::new(false));
    let mut probe = bus.subscribe("u1-u2");
    let j = joined.clone();
    probe.bind("pusher:subscription_succeeded", move |_| j.store(true, Ordering::SeqCst));
    wait_until("thread subscription", || joined.load(Ordering::SeqCst)).await;

    let receipt = post_as(addr, "u2", "/api/threads/u1/read", json!({})).await;
    assert_eq!(receipt["read_count"], 2);

    wait_until("read markers", || thread.messages().iter().all(|m| m.date_read.is_some())).await;

    post_as(addr, "u2", "/api/messages", json!({ "recipient_id": "u1", "text": "three" })).await;
    wait_until("append", || thread.len() == 3).await;
    assert_eq!(ui.scrolls(), 1);
}
