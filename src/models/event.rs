//! Event and message models for WebSocket and HTTP API.

use serde::{Deserialize, Serialize};

/// Application event names published by the action layer.
pub mod names {
    pub const MESSAGE_NEW: &str = "message:new";
    pub const MESSAGES_READ: &str = "messages:read";
    pub const LIKE_NEW: &str = "like:new";
    pub const MATCH_NEW: &str = "match:new";
}

/// Protocol events exchanged between the bus server and its sockets.
pub mod protocol {
    pub const CONNECTION_ESTABLISHED: &str = "connection_established";
    pub const SUBSCRIPTION_SUCCEEDED: &str = "pusher_internal:subscription_succeeded";
    pub const MEMBER_ADDED: &str = "pusher_internal:member_added";
    pub const MEMBER_REMOVED: &str = "pusher_internal:member_removed";
    pub const ERROR: &str = "pusher:error";
    pub const PONG: &str = "pusher:pong";

    /// Names handlers bind to on the client side (internal names are translated).
    pub const CLIENT_SUBSCRIPTION_SUCCEEDED: &str = "pusher:subscription_succeeded";
    pub const CLIENT_MEMBER_ADDED: &str = "pusher:member_added";
    pub const CLIENT_MEMBER_REMOVED: &str = "pusher:member_removed";
    /// Raised locally by the client transport when a channel could not be authorized.
    pub const CLIENT_SUBSCRIPTION_ERROR: &str = "pusher:subscription_error";

    /// Error code sent when a subscription is refused.
    pub const SUBSCRIBE_REFUSED: u16 = 4009;

    /// Map a server-internal event name to the one client handlers bind to.
    pub fn client_event_name(event: &str) -> &str {
        match event {
            SUBSCRIPTION_SUCCEEDED => CLIENT_SUBSCRIPTION_SUCCEEDED,
            MEMBER_ADDED => CLIENT_MEMBER_ADDED,
            MEMBER_REMOVED => CLIENT_MEMBER_REMOVED,
            other => other,
        }
    }
}

/// Event sent over WebSocket to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsEvent {
    pub event: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl WsEvent {
    pub fn new(event: &str, channel: &str, data: serde_json::Value) -> Self {
        Self {
            event: event.to_string(),
            channel: Some(channel.to_string()),
            data,
        }
    }
}

/// Payload for HTTP API to trigger a broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastRequest {
    pub channel: String,
    pub event: String,
    pub data: serde_json::Value,
}

/// WebSocket client message: subscribe / unsubscribe.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe { data: SubscribePayload },
    Unsubscribe { data: UnsubscribePayload },
    Ping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribePayload {
    pub channel: String,
    /// For private/presence: hex HMAC signature from `/api/channel-auth`.
    #[serde(default)]
    pub auth: Option<String>,
    /// For presence: the signed channel data (`{"user_id": ...}`).
    #[serde(default)]
    pub channel_data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsubscribePayload {
    pub channel: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_message_subscribe_parses() {
        let raw = r#"{"event":"subscribe","data":{"channel":"u1-u2"}}"#;
        match serde_json::from_str::<ClientMessage>(raw).unwrap() {
            ClientMessage::Subscribe { data } => {
                assert_eq!(data.channel, "u1-u2");
                assert!(data.auth.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn internal_names_translate_for_clients() {
        assert_eq!(
            protocol::client_event_name(protocol::MEMBER_ADDED),
            "pusher:member_added"
        );
        assert_eq!(protocol::client_event_name(names::LIKE_NEW), "like:new");
    }
}
