//! Channel subscription and broadcast: one backend subscription per channel, fan-out to local receivers.

use crate::error::AppResult;
use crate::models::event::WsEvent;
use crate::repositories::{PubSubBackend, CHANNEL_BUFFER};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct LocalChannel {
    tx: broadcast::Sender<String>,
    pump: JoinHandle<()>,
}

/// Manages channel subscriptions: ensures one backend subscriber per channel and distributes messages.
#[derive(Clone)]
pub struct ChannelService {
    backend: Arc<dyn PubSubBackend>,
    /// channel_name -> local broadcast sender plus the task pumping backend messages into it.
    subscribers: Arc<RwLock<HashMap<String, LocalChannel>>>,
}

impl ChannelService {
    pub fn new(backend: Arc<dyn PubSubBackend>) -> Self {
        Self {
            backend,
            subscribers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get or create a broadcast receiver for the channel. Multiple callers get the same channel's receiver.
    pub async fn subscribe(&self, channel: &str) -> AppResult<broadcast::Receiver<String>> {
        let mut subs = self.subscribers.write().await;
        if let Some(local) = subs.get(channel) {
            return Ok(local.tx.subscribe());
        }

        let mut upstream = self.backend.subscribe_to_channel(channel).await?;
        let (tx, rx) = broadcast::channel(CHANNEL_BUFFER);
        let tx_pump = tx.clone();
        let name = channel.to_string();
        let pump = tokio::spawn(async move {
            loop {
                match upstream.recv().await {
                    Ok(msg) => {
                        let _ = tx_pump.send(msg);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(channel = %name, skipped, "channel pump lagged, events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        subs.insert(channel.to_string(), LocalChannel { tx, pump });
        Ok(rx)
    }

    /// Broadcast an event to a channel (publish to the backend; all subscribers receive it).
    pub async fn broadcast(
        &self,
        channel: &str,
        event: &str,
        data: serde_json::Value,
    ) -> AppResult<u64> {
        let ws_event = WsEvent::new(event, channel, data);
        let payload = serde_json::to_string(&ws_event)?;
        let count = self.backend.publish(channel, &payload).await?;
        info!(channel = %channel, event = %event, count, "broadcast");
        Ok(count)
    }

    /// Drop the backend subscription once no local receiver is left.
    /// Callers must have dropped their receiver before calling this.
    pub async fn release(&self, channel: &str) {
        let mut subs = self.subscribers.write().await;
        let idle = subs
            .get(channel)
            .map(|local| local.tx.receiver_count() == 0)
            .unwrap_or(false);
        if !idle {
            return;
        }
        if let Some(local) = subs.remove(channel) {
            local.pump.abort();
            // The pump owns the backend receiver; it must be gone first.
            let _ = local.pump.await;
        }
        drop(subs);
        self.backend.release_channel(channel).await;
        debug!(channel = %channel, "released idle channel");
    }

    /// Number of channels with a live backend subscription on this node.
    pub async fn active_channels(&self) -> usize {
        self.subscribers.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::MemoryPubSub;
    use serde_json::json;

    #[tokio::test]
    async fn broadcast_fans_out_to_every_local_receiver() {
        let service = ChannelService::new(Arc::new(MemoryPubSub::new()));
        let mut first = service.subscribe("u1-u2").await.unwrap();
        let mut second = service.subscribe("u1-u2").await.unwrap();

        service
            .broadcast("u1-u2", "message:new", json!({ "id": "m1" }))
            .await
            .unwrap();

        for rx in [&mut first, &mut second] {
            let raw = rx.recv().await.unwrap();
            let ev: WsEvent = serde_json::from_str(&raw).unwrap();
            assert_eq!(ev.event, "message:new");
            assert_eq!(ev.channel.as_deref(), Some("u1-u2"));
        }
        assert_eq!(service.active_channels().await, 1);
    }

    #[tokio::test]
    async fn release_keeps_channel_while_a_receiver_remains() {
        let service = ChannelService::new(Arc::new(MemoryPubSub::new()));
        let first = service.subscribe("private-u1").await.unwrap();
        let second = service.subscribe("private-u1").await.unwrap();

        drop(first);
        service.release("private-u1").await;
        assert_eq!(service.active_channels().await, 1);

        drop(second);
        service.release("private-u1").await;
        assert_eq!(service.active_channels().await, 0);
    }

    #[tokio::test]
    async fn released_conversations_leave_no_backend_topic() {
        let backend = MemoryPubSub::new();
        let service = ChannelService::new(Arc::new(backend.clone()));
        for other in ["u2", "u3", "u4"] {
            let channel = format!("u1-{}", other);
            let rx = service.subscribe(&channel).await.unwrap();
            drop(rx);
            service.release(&channel).await;
        }
        assert_eq!(service.active_channels().await, 0);
        assert_eq!(backend.topic_count().await, 0);
    }
}
