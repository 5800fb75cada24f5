//! Client-side notification core: what a logged-in browser tab (or any
//! other client) runs against the bus.
//!
//! State containers ([`UnreadCounter`], [`PresenceRoster`]) are built once
//! per session and handed to the components that mutate them. Components
//! that bind channels ([`NotificationDispatcher`], [`PresenceChannel`],
//! [`ChatThread`]) unbind on drop.

pub mod api;
pub mod bus;
pub mod dispatcher;
pub mod presence;
pub mod session;
pub mod testing;
pub mod thread;
pub mod transport;
pub mod unread;

pub use api::ApiClient;
pub use bus::{BindingId, BusClient, ChannelHandle, WeakBusClient};
pub use dispatcher::{ActiveView, NotificationDispatcher, NotificationUi, Toast, ToastKind};
pub use presence::{PresenceChannel, PresenceRoster, RosterState};
pub use session::{ClientStores, NotificationSession, SessionInfo};
pub use thread::{ChatThread, ThreadView};
pub use transport::{ClientConfig, WsTransport};
pub use unread::UnreadCounter;

use thiserror::Error;

/// Network side of the bus. Both calls are fire-and-forget: a transport
/// that is not connected yet queues the request or replays it on connect.
///
/// Both calls are made with the bus registry locked: they must return
/// promptly and must not call back into the [`BusClient`].
pub trait Transport: Send + Sync {
    /// First local reference to `channel` was taken.
    fn join(&self, channel: &str);
    /// Last local reference to `channel` was released.
    fn leave(&self, channel: &str);
}

/// Client-side failures. Logged where they happen; never surfaced to the UI.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    #[error("Channel authorization refused: {0}")]
    Unauthorized(String),

    #[error("Invalid payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Connection closed")]
    Closed,
}
