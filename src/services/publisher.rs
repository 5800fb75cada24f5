//! Server-side publish path: best-effort, fire-and-forget event delivery.
//!
//! The domain write has already succeeded when `publish` is called. Nothing
//! here can fail the caller: events go onto a queue drained by one worker
//! task, so publishes leave in the order they were enqueued, and any bus
//! error is logged and the event dropped.

use crate::models::notification::NotificationEvent;
use crate::services::ChannelService;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug)]
struct Outgoing {
    channel: String,
    event: String,
    data: serde_json::Value,
}

/// Handle to the publish worker. Cheap to clone.
#[derive(Clone)]
pub struct Publisher {
    queue: Option<mpsc::UnboundedSender<Outgoing>>,
}

impl Publisher {
    /// Start the worker on the current tokio runtime.
    pub fn spawn(channels: ChannelService) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Outgoing>();
        tokio::spawn(async move {
            while let Some(out) = rx.recv().await {
                match channels.broadcast(&out.channel, &out.event, out.data).await {
                    Ok(count) => {
                        debug!(channel = %out.channel, event = %out.event, count, "published")
                    }
                    Err(e) => {
                        warn!(channel = %out.channel, event = %out.event, error = %e, "publish failed, event dropped")
                    }
                }
            }
        });
        Self { queue: Some(tx) }
    }

    /// A publisher for when no bus is configured: every publish is a logged no-op.
    pub fn disabled() -> Self {
        Self { queue: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.queue.is_some()
    }

    /// Queue `event` on `channel`. Never fails and never waits for delivery.
    pub fn publish<T: Serialize + ?Sized>(&self, channel: &str, event: &str, payload: &T) {
        let Some(queue) = &self.queue else {
            debug!(channel = %channel, event = %event, "bus unavailable, event not published");
            return;
        };
        let data = match serde_json::to_value(payload) {
            Ok(data) => data,
            Err(e) => {
                warn!(channel = %channel, event = %event, error = %e, "unserializable payload, event dropped");
                return;
            }
        };
        let out = Outgoing {
            channel: channel.to_string(),
            event: event.to_string(),
            data,
        };
        if queue.send(out).is_err() {
            warn!(channel = %channel, event = %event, "publish worker stopped, event dropped");
        }
    }

    pub fn publish_event(&self, channel: &str, event: &NotificationEvent) {
        match event.payload() {
            Ok(data) => self.publish(channel, event.event_name(), &data),
            Err(e) => {
                warn!(channel = %channel, event = event.event_name(), error = %e, "unserializable payload, event dropped")
            }
        }
    }
}
