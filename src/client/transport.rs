//! WebSocket transport for [`BusClient`]: one connection to `/ws`, the set
//! of joined channels replayed after every reconnect.

use std::collections::BTreeSet;
use std::env;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};

use super::api::ApiClient;
use super::bus::{BusClient, WeakBusClient};
use super::{ClientError, Transport};
use crate::models::channel::ChannelType;
use crate::models::event::{protocol, WsEvent};

const PING_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub ws_url: String,
    pub api_url: String,
    pub token: String,
    pub reconnect_delay: Duration,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ClientError> {
        let token = env::var("NOTIF_TOKEN")
            .map_err(|_| ClientError::Config("NOTIF_TOKEN must be set".to_string()))?;
        let reconnect_secs = env::var("NOTIF_RECONNECT_SECS")
            .unwrap_or_else(|_| "3".to_string())
            .parse::<u64>()
            .map_err(|e| ClientError::Config(format!("NOTIF_RECONNECT_SECS: {e}")))?;
        Ok(Self {
            ws_url: env::var("NOTIF_WS_URL").unwrap_or_else(|_| "ws://127.0.0.1:3000/ws".to_string()),
            api_url: env::var("NOTIF_API_URL").unwrap_or_else(|_| "http://127.0.0.1:3000".to_string()),
            token,
            reconnect_delay: Duration::from_secs(reconnect_secs.max(1)),
        })
    }
}

#[derive(Debug)]
enum Command {
    Join(String),
    Leave(String),
}

/// Background connection feeding a [`BusClient`]. Aborted on drop.
pub struct WsTransport {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl WsTransport {
    /// Spawn the connection loop and attach it to `bus`. Channels the bus
    /// already references are joined as soon as the socket is up.
    pub fn connect(config: ClientConfig, bus: &BusClient) -> Result<Arc<Self>, ClientError> {
        let api = ApiClient::new(&config.api_url, &config.token)?;
        let (commands, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(config, api, bus.downgrade(), rx));
        let transport = Arc::new(Self { commands, task });
        bus.attach_transport(transport.clone());
        Ok(transport)
    }

    fn command(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("transport stopped, command dropped");
        }
    }
}

impl Transport for WsTransport {
    fn join(&self, channel: &str) {
        self.command(Command::Join(channel.to_string()));
    }

    fn leave(&self, channel: &str) {
        self.command(Command::Leave(channel.to_string()));
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    config: ClientConfig,
    api: ApiClient,
    bus: WeakBusClient,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let mut joined = BTreeSet::new();
    loop {
        match connection(&config, &api, &bus, &mut joined, &mut commands).await {
            Ok(()) => {
                debug!("transport finished");
                return;
            }
            Err(e) => warn!(error = %e, "bus connection lost"),
        }
        tokio::time::sleep(config.reconnect_delay).await;
        info!(url = %config.ws_url, "reconnecting");
    }
}

/// One socket lifetime. `Ok` means the bus or the transport is gone and
/// there is nothing left to reconnect for.
async fn connection(
    config: &ClientConfig,
    api: &ApiClient,
    bus: &WeakBusClient,
    joined: &mut BTreeSet<String>,
    commands: &mut mpsc::UnboundedReceiver<Command>,
) -> Result<(), ClientError> {
    let (stream, _) = connect_async(config.ws_url.as_str()).await?;
    let (mut write, mut read) = stream.split();

    let socket_id = loop {
        let msg = read.next().await.ok_or(ClientError::Closed)??;
        if let Message::Text(text) = msg {
            let event: WsEvent = serde_json::from_str(&text)?;
            if event.event == protocol::CONNECTION_ESTABLISHED {
                break event
                    .data
                    .get("socket_id")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .ok_or(ClientError::Closed)?;
            }
        }
    };
    info!(socket_id = %socket_id, "bus connected");

    // Resubscribe; presence resyncs wholesale from the new snapshot.
    for channel in joined.iter() {
        if let Some(frame) = subscribe_frame(api, bus, &socket_id, channel).await {
            write.send(Message::Text(frame)).await?;
        }
    }

    let mut ping = tokio::time::interval(PING_INTERVAL);
    ping.tick().await;

    loop {
        tokio::select! {
            incoming = read.next() => {
                let msg = match incoming {
                    Some(msg) => msg?,
                    None => return Err(ClientError::Closed),
                };
                match msg {
                    Message::Text(text) => {
                        let Some(bus) = bus.upgrade() else {
                            return Ok(());
                        };
                        deliver(&bus, &text);
                    }
                    Message::Close(_) => return Err(ClientError::Closed),
                    _ => {}
                }
            }
            command = commands.recv() => {
                let Some(command) = command else {
                    return Ok(());
                };
                match command {
                    Command::Join(channel) => {
                        if joined.insert(channel.clone()) {
                            if let Some(frame) = subscribe_frame(api, bus, &socket_id, &channel).await {
                                write.send(Message::Text(frame)).await?;
                            }
                        }
                    }
                    Command::Leave(channel) => {
                        if joined.remove(&channel) {
                            let frame = json!({ "event": "unsubscribe", "data": { "channel": channel } });
                            write.send(Message::Text(frame.to_string())).await?;
                        }
                    }
                }
            }
            _ = ping.tick() => {
                write.send(Message::Text(json!({ "event": "ping" }).to_string())).await?;
            }
        }
    }
}

/// The `subscribe` frame for `channel`, authorized when private or presence.
/// A refused authorization yields `None` and a `pusher:subscription_error`
/// on the local bus: nothing is subscribed.
async fn subscribe_frame(
    api: &ApiClient,
    bus: &WeakBusClient,
    socket_id: &str,
    channel: &str,
) -> Option<String> {
    if !ChannelType::from_name(channel).is_private() {
        return Some(json!({ "event": "subscribe", "data": { "channel": channel } }).to_string());
    }

    let signed = match api.authorize_channel(socket_id, channel).await {
        Ok(signed) => signed,
        Err(e) => {
            warn!(channel = %channel, error = %e, "channel authorization failed");
            if let Some(bus) = bus.upgrade() {
                bus.dispatch(
                    channel,
                    protocol::CLIENT_SUBSCRIPTION_ERROR,
                    &json!({ "error": e.to_string() }),
                );
            }
            return None;
        }
    };

    let channel_data = match signed.channel_data.as_deref().map(serde_json::from_str::<serde_json::Value>) {
        Some(Ok(value)) => Some(value),
        Some(Err(e)) => {
            warn!(channel = %channel, error = %e, "unreadable channel_data");
            return None;
        }
        None => None,
    };
    Some(
        json!({
            "event": "subscribe",
            "data": {
                "channel": channel,
                "auth": signed.auth,
                "channel_data": channel_data
            }
        })
        .to_string(),
    )
}

/// Route one server frame to the bus under its client-facing event name.
fn deliver(bus: &BusClient, text: &str) {
    let event: WsEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            debug!(error = %e, "ignoring unparseable frame");
            return;
        }
    };
    let Some(channel) = event.channel.as_deref() else {
        trace!(event = %event.event, "connection-level event");
        return;
    };

    if event.event == protocol::ERROR {
        warn!(channel = %channel, data = %event.data, "subscription refused by server");
        bus.dispatch(channel, protocol::CLIENT_SUBSCRIPTION_ERROR, &event.data);
        return;
    }
    bus.dispatch(channel, protocol::client_event_name(&event.event), &event.data);
}
