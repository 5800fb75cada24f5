//! Pub/sub backends: channel messaging and presence storage.

mod memory;
mod redis_repo;

pub use memory::MemoryPubSub;
pub use redis_repo::RedisRepository;

use crate::error::AppError;
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Buffer size for per-channel broadcast senders.
pub const CHANNEL_BUFFER: usize = 64;

/// Transport the bus server fans events through. Presence members are stored
/// per channel as `socket_id -> serialized member`.
#[async_trait]
pub trait PubSubBackend: Send + Sync {
    /// Publish a raw message to a channel; returns how many subscribers got it.
    async fn publish(&self, channel: &str, message: &str) -> Result<u64, AppError>;

    /// Receive everything published to `channel` from now on.
    async fn subscribe_to_channel(
        &self,
        channel: &str,
    ) -> Result<broadcast::Receiver<String>, AppError>;

    /// Store a socket's membership. Returns `true` when no other socket of
    /// `user_id` was on the channel. Check and insert happen atomically.
    async fn presence_add(
        &self,
        channel: &str,
        socket_id: &str,
        user_id: &str,
        member_data: &str,
    ) -> Result<bool, AppError>;

    /// Remove a socket. Returns its user id when that was the user's last
    /// socket on the channel; `None` for unknown sockets. Atomic like
    /// [`PubSubBackend::presence_add`].
    async fn presence_remove(&self, channel: &str, socket_id: &str)
        -> Result<Option<String>, AppError>;

    /// All members of a presence channel as `(socket_id, member_data)`.
    async fn presence_members(&self, channel: &str) -> Result<Vec<(String, String)>, AppError>;

    /// Forget local state for a channel nobody on this node listens to.
    async fn release_channel(&self, _channel: &str) {}
}
