//! Redis connection and pub/sub for channel messaging and presence storage.

use crate::error::AppError;
use async_trait::async_trait;
use redis::AsyncCommands;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use futures::StreamExt;

use super::{PubSubBackend, CHANNEL_BUFFER};

const CHANNEL_PREFIX: &str = "spark:channel:";
const PRESENCE_SET_PREFIX: &str = "spark:presence:";
const PRESENCE_HASH_PREFIX: &str = "spark:presence_hash:";
const PRESENCE_OWNER_PREFIX: &str = "spark:presence_owner:";
const PRESENCE_USERS_PREFIX: &str = "spark:presence_users:";

// KEYS: socket set, member hash, socket -> user hash, user -> socket count hash.
// ARGV: socket id, user id, member data. Returns 1 when the user's only socket.
const ADD_MEMBER_LUA: &str = r"
redis.call('SADD', KEYS[1], ARGV[1])
redis.call('HSET', KEYS[2], ARGV[1], ARGV[3])
local prev = redis.call('HGET', KEYS[3], ARGV[1])
if prev ~= ARGV[2] then
  if prev and redis.call('HINCRBY', KEYS[4], prev, -1) <= 0 then
    redis.call('HDEL', KEYS[4], prev)
  end
  redis.call('HSET', KEYS[3], ARGV[1], ARGV[2])
  redis.call('HINCRBY', KEYS[4], ARGV[2], 1)
end
if tonumber(redis.call('HGET', KEYS[4], ARGV[2])) == 1 then
  return 1
end
return 0
";

// Same KEYS; ARGV: socket id. Returns the user id when its last socket left.
const REMOVE_MEMBER_LUA: &str = r"
local user = redis.call('HGET', KEYS[3], ARGV[1])
if not user then
  return false
end
redis.call('SREM', KEYS[1], ARGV[1])
redis.call('HDEL', KEYS[2], ARGV[1])
redis.call('HDEL', KEYS[3], ARGV[1])
if redis.call('HINCRBY', KEYS[4], user, -1) <= 0 then
  redis.call('HDEL', KEYS[4], user)
  return user
end
return false
";

fn channel_key(channel: &str) -> String {
    format!("{}{}", CHANNEL_PREFIX, channel)
}

fn presence_keys(channel: &str) -> [String; 4] {
    [
        PRESENCE_SET_PREFIX,
        PRESENCE_HASH_PREFIX,
        PRESENCE_OWNER_PREFIX,
        PRESENCE_USERS_PREFIX,
    ]
    .map(|prefix| format!("{}{}", prefix, channel))
}

/// Redis-backed repository: pub/sub for events, sets/hash for presence.
#[derive(Clone)]
pub struct RedisRepository {
    client: Arc<redis::Client>,
    add_member: redis::Script,
    remove_member: redis::Script,
}

impl RedisRepository {
    /// Create repository from Redis URL. Does not connect yet.
    pub fn new(redis_url: &str) -> Result<Self, AppError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client: Arc::new(client),
            add_member: redis::Script::new(ADD_MEMBER_LUA),
            remove_member: redis::Script::new(REMOVE_MEMBER_LUA),
        })
    }

    /// Round-trip to the server.
    pub async fn ping(&self) -> Result<(), AppError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }

    /// Get a multiplexed connection for commands (publish, set, etc.).
    pub async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, AppError> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn)
    }
}

#[async_trait]
impl PubSubBackend for RedisRepository {
    async fn publish(&self, channel: &str, message: &str) -> Result<u64, AppError> {
        let mut conn = self.connection().await?;
        let key = channel_key(channel);
        let count: u64 = conn.publish(&key, message).await?;
        debug!(channel = %channel, count, "published");
        Ok(count)
    }

    /// Uses one Redis connection per channel, forwarding messages to a broadcast channel.
    async fn subscribe_to_channel(
        &self,
        channel: &str,
    ) -> Result<broadcast::Receiver<String>, AppError> {
        let conn = self.client.get_async_connection().await?;
        let mut pubsub = conn.into_pubsub();
        let key = channel_key(channel);
        pubsub.subscribe(&key).await?;
        info!(channel = %channel, "subscribed to redis channel");

        let (tx, rx) = broadcast::channel(CHANNEL_BUFFER);
        let mut stream = pubsub.into_on_message();
        let channel = channel.to_string();

        tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                match msg.get_payload::<String>() {
                    Ok(payload) => {
                        if tx.send(payload).is_err() {
                            // Nobody left listening locally.
                            break;
                        }
                    }
                    Err(e) => warn!(channel = %channel, error = %e, "undecodable redis payload"),
                }
            }
            debug!(channel = %channel, "redis subscription closed");
        });

        Ok(rx)
    }

    async fn presence_add(
        &self,
        channel: &str,
        socket_id: &str,
        user_id: &str,
        member_data: &str,
    ) -> Result<bool, AppError> {
        let mut conn = self.connection().await?;
        let [set_key, hash_key, owner_key, users_key] = presence_keys(channel);
        let only: i64 = self
            .add_member
            .key(set_key)
            .key(hash_key)
            .key(owner_key)
            .key(users_key)
            .arg(socket_id)
            .arg(user_id)
            .arg(member_data)
            .invoke_async(&mut conn)
            .await?;
        Ok(only == 1)
    }

    async fn presence_remove(
        &self,
        channel: &str,
        socket_id: &str,
    ) -> Result<Option<String>, AppError> {
        let mut conn = self.connection().await?;
        let [set_key, hash_key, owner_key, users_key] = presence_keys(channel);
        let gone: Option<String> = self
            .remove_member
            .key(set_key)
            .key(hash_key)
            .key(owner_key)
            .key(users_key)
            .arg(socket_id)
            .invoke_async(&mut conn)
            .await?;
        Ok(gone)
    }

    async fn presence_members(&self, channel: &str) -> Result<Vec<(String, String)>, AppError> {
        let mut conn = self.connection().await?;
        let [_, hash_key, _, _] = presence_keys(channel);
        let map: std::collections::HashMap<String, String> = conn.hgetall(&hash_key).await?;
        Ok(map.into_iter().collect())
    }
}
