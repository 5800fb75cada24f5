//! WebSocket handler: subscribe, unsubscribe, presence membership, message forwarding.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use std::collections::HashMap;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::handlers::http::AppState;
use crate::models::channel::ChannelType;
use crate::models::event::{protocol, ClientMessage, SubscribePayload};
use crate::models::presence::{generate_socket_id, PresenceSnapshot};

/// Upgrade HTTP to WebSocket.
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: AppState, socket: WebSocket) {
    let socket_id = generate_socket_id();
    info!(socket_id = %socket_id, "ws connected");

    let (mut sender, mut receiver) = socket.split();

    let conn_msg = json!({
        "event": protocol::CONNECTION_ESTABLISHED,
        "data": { "socket_id": socket_id }
    });
    if sender.send(Message::Text(conn_msg.to_string())).await.is_err() {
        return;
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    let mut session = SocketSession {
        state,
        socket_id,
        tx,
        subscriptions: HashMap::new(),
    };

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Subscribe { data }) => session.subscribe(data).await,
                Ok(ClientMessage::Unsubscribe { data }) => session.unsubscribe(&data.channel).await,
                Ok(ClientMessage::Ping) => {
                    session.send(json!({ "event": protocol::PONG, "data": {} }));
                }
                Err(e) => {
                    debug!(socket_id = %session.socket_id, error = %e, "ignoring unparseable client message")
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    session.teardown().await;
    send_task.abort();
    info!(socket_id = %session.socket_id, "ws disconnected");
}

/// Per-connection state: one forwarding task per subscribed channel.
struct SocketSession {
    state: AppState,
    socket_id: String,
    tx: mpsc::UnboundedSender<String>,
    subscriptions: HashMap<String, JoinHandle<()>>,
}

impl SocketSession {
    fn send(&self, value: serde_json::Value) {
        let _ = self.tx.send(value.to_string());
    }

    fn send_error(&self, channel: &str, message: &str) {
        self.send(json!({
            "event": protocol::ERROR,
            "channel": channel,
            "data": { "message": message, "code": protocol::SUBSCRIBE_REFUSED }
        }));
    }

    async fn subscribe(&mut self, data: SubscribePayload) {
        let channel = data.channel.clone();
        if channel.trim().is_empty() {
            self.send_error(&channel, "Channel name required");
            return;
        }
        let channel_type = ChannelType::from_name(&channel);
        let channel_data = data.channel_data.as_ref().map(|v| v.to_string());

        if let Err(e) = self.state.auth_service().verify_channel_auth(
            &channel,
            &self.socket_id,
            data.auth.as_deref(),
            channel_data.as_deref(),
        ) {
            debug!(socket_id = %self.socket_id, channel = %channel, error = %e, "subscription refused");
            self.send_error(&channel, "Auth failed for channel");
            return;
        }

        if self.subscriptions.contains_key(&channel) {
            // Already forwarding on this socket; just confirm again.
            if let Err(e) = self.confirm(&channel, channel_type).await {
                warn!(channel = %channel, error = %e, "re-confirm failed");
            }
            return;
        }

        match self.join(&channel, channel_type, &data).await {
            Ok(channel_rx) => {
                let forwarder = spawn_forwarder(channel.clone(), channel_rx, self.tx.clone());
                self.subscriptions.insert(channel.clone(), forwarder);
                debug!(socket_id = %self.socket_id, channel = %channel, "subscribed");
            }
            Err(e) => {
                warn!(channel = %channel, error = %e, "subscribe failed");
                self.state.channel_service.release(&channel).await;
                self.send_error(&channel, &format!("Subscribe failed: {}", e));
            }
        }
    }

    /// Open the channel receiver, register presence, and confirm. The
    /// forwarder is started by the caller afterwards, so anything published
    /// meanwhile is buffered in the receiver and reaches the client after
    /// the roster snapshot.
    async fn join(
        &self,
        channel: &str,
        channel_type: ChannelType,
        data: &SubscribePayload,
    ) -> AppResult<broadcast::Receiver<String>> {
        let channel_rx = self.state.channel_service.subscribe(channel).await?;

        if channel_type == ChannelType::Presence {
            let user_id = data
                .channel_data
                .as_ref()
                .and_then(|v| v.get("user_id"))
                .and_then(|v| v.as_str())
                .filter(|id| !id.is_empty())
                .ok_or_else(|| AppError::Validation("presence channel_data needs user_id".to_string()))?;
            let user_info = data.channel_data.as_ref().and_then(|v| v.get("user_info")).cloned();

            let (arrived, snapshot) = self
                .state
                .presence_service()
                .join(channel, &self.socket_id, user_id, user_info.clone())
                .await?;
            self.send_succeeded(channel, Some(&snapshot));
            if arrived {
                if let Err(e) = self
                    .state
                    .channel_service
                    .broadcast(
                        channel,
                        protocol::MEMBER_ADDED,
                        json!({ "user_id": user_id, "user_info": user_info }),
                    )
                    .await
                {
                    warn!(channel = %channel, error = %e, "member_added broadcast failed");
                }
            }
        } else {
            self.send_succeeded(channel, None);
        }
        Ok(channel_rx)
    }

    async fn confirm(&self, channel: &str, channel_type: ChannelType) -> AppResult<()> {
        if channel_type == ChannelType::Presence {
            let snapshot = self.state.presence_service().snapshot(channel).await?;
            self.send_succeeded(channel, Some(&snapshot));
        } else {
            self.send_succeeded(channel, None);
        }
        Ok(())
    }

    fn send_succeeded(&self, channel: &str, roster: Option<&PresenceSnapshot>) {
        let msg = match roster {
            Some(snapshot) => json!({
                "event": protocol::SUBSCRIPTION_SUCCEEDED,
                "channel": channel,
                "data": {
                    "presence": {
                        "ids": snapshot.ids,
                        "hash": {},
                        "count": snapshot.count
                    }
                }
            }),
            None => json!({
                "event": protocol::SUBSCRIPTION_SUCCEEDED,
                "channel": channel
            }),
        };
        self.send(msg);
    }

    async fn unsubscribe(&mut self, channel: &str) {
        let Some(forwarder) = self.subscriptions.remove(channel) else {
            return;
        };
        forwarder.abort();
        // Wait until the task (and its receiver) is gone before releasing.
        let _ = forwarder.await;
        self.state.channel_service.release(channel).await;

        if ChannelType::from_name(channel) == ChannelType::Presence {
            match self
                .state
                .presence_service()
                .remove_member(channel, &self.socket_id)
                .await
            {
                Ok(Some(user_id)) => {
                    if let Err(e) = self
                        .state
                        .channel_service
                        .broadcast(channel, protocol::MEMBER_REMOVED, json!({ "user_id": user_id }))
                        .await
                    {
                        warn!(channel = %channel, error = %e, "member_removed broadcast failed");
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(channel = %channel, error = %e, "presence removal failed"),
            }
        }
        debug!(socket_id = %self.socket_id, channel = %channel, "unsubscribed");
    }

    async fn teardown(&mut self) {
        let channels: Vec<String> = self.subscriptions.keys().cloned().collect();
        for channel in channels {
            self.unsubscribe(&channel).await;
        }
    }
}

fn spawn_forwarder(
    channel: String,
    mut channel_rx: broadcast::Receiver<String>,
    tx: mpsc::UnboundedSender<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match channel_rx.recv().await {
                Ok(payload) => {
                    if tx.send(payload).is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(channel = %channel, skipped, "socket lagged, events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
