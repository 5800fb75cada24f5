//! Real-time notification and presence layer for a swipe/match/message app.
//!
//! Server side: a Pusher-style channel bus (WebSocket + Redis or in-process
//! fan-out) with private, presence and conversation channels, plus the
//! action layer that publishes `message:new`, `messages:read`, `like:new`
//! and `match:new` after the record store accepted the write.
//!
//! Client side ([`client`]): the subscription registry, presence roster,
//! unread counter, notification dispatcher and chat thread binding a
//! logged-in session runs against that bus.

pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod services;

pub use config::Config;
pub use error::AppError;
pub use handlers::http::AppState;
pub use services::channel::ChannelService;
pub use services::presence::PresenceService;

use axum::routing::{get, post};
use handlers::http;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Build the router (ws, channel auth, session, actions, broadcast, health).
/// Used by main and by integration tests.
pub fn create_app(state: AppState) -> axum::Router {
    let api_routes = axum::Router::new()
        .route("/broadcast", post(http::broadcast))
        .route("/channel-auth", post(http::channel_auth))
        .route("/session", get(http::session))
        .route("/messages", post(handlers::send_message))
        .route("/messages/unread-count", get(handlers::unread_count))
        .route("/likes", post(handlers::record_like))
        .route("/threads/:user_id/read", post(handlers::mark_thread_read));

    axum::Router::new()
        .route("/ws", get(handlers::ws_handler))
        .route("/health", get(http::health))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
