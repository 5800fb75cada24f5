//! In-memory pub/sub for single-node deployments and tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};

use super::{PubSubBackend, CHANNEL_BUFFER};
use crate::error::AppError;

struct Member {
    user_id: String,
    data: String,
}

#[derive(Default)]
struct Topics {
    /// channel -> broadcast sender.
    senders: HashMap<String, broadcast::Sender<String>>,
    /// channel -> socket_id -> member.
    presence: HashMap<String, HashMap<String, Member>>,
}

/// In-process stand-in for Redis.
#[derive(Clone, Default)]
pub struct MemoryPubSub {
    topics: Arc<Mutex<Topics>>,
}

impl MemoryPubSub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Channels that currently hold a sender.
    pub async fn topic_count(&self) -> usize {
        self.topics.lock().await.senders.len()
    }
}

#[async_trait]
impl PubSubBackend for MemoryPubSub {
    async fn publish(&self, channel: &str, message: &str) -> Result<u64, AppError> {
        let mut topics = self.topics.lock().await;
        let Some(tx) = topics.senders.get(channel) else {
            return Ok(0);
        };
        match tx.send(message.to_string()) {
            Ok(count) => Ok(count as u64),
            Err(_) => {
                topics.senders.remove(channel);
                Ok(0)
            }
        }
    }

    async fn subscribe_to_channel(
        &self,
        channel: &str,
    ) -> Result<broadcast::Receiver<String>, AppError> {
        let mut topics = self.topics.lock().await;
        let tx = topics
            .senders
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_BUFFER).0);
        Ok(tx.subscribe())
    }

    async fn presence_add(
        &self,
        channel: &str,
        socket_id: &str,
        user_id: &str,
        member_data: &str,
    ) -> Result<bool, AppError> {
        let mut topics = self.topics.lock().await;
        let members = topics.presence.entry(channel.to_string()).or_default();
        let first = !members
            .iter()
            .any(|(sid, m)| m.user_id == user_id && sid != socket_id);
        members.insert(
            socket_id.to_string(),
            Member {
                user_id: user_id.to_string(),
                data: member_data.to_string(),
            },
        );
        Ok(first)
    }

    async fn presence_remove(
        &self,
        channel: &str,
        socket_id: &str,
    ) -> Result<Option<String>, AppError> {
        let mut topics = self.topics.lock().await;
        let Some(members) = topics.presence.get_mut(channel) else {
            return Ok(None);
        };
        let Some(leaving) = members.remove(socket_id) else {
            return Ok(None);
        };
        let last = !members.values().any(|m| m.user_id == leaving.user_id);
        if members.is_empty() {
            topics.presence.remove(channel);
        }
        Ok(last.then_some(leaving.user_id))
    }

    async fn presence_members(&self, channel: &str) -> Result<Vec<(String, String)>, AppError> {
        let topics = self.topics.lock().await;
        Ok(topics
            .presence
            .get(channel)
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.data.clone())).collect())
            .unwrap_or_default())
    }

    async fn release_channel(&self, channel: &str) {
        let mut topics = self.topics.lock().await;
        if topics
            .senders
            .get(channel)
            .is_some_and(|tx| tx.receiver_count() == 0)
        {
            topics.senders.remove(channel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_subscribers_only_of_that_channel() {
        let bus = MemoryPubSub::new();
        let mut a = bus.subscribe_to_channel("a").await.unwrap();
        let mut b = bus.subscribe_to_channel("b").await.unwrap();

        assert_eq!(bus.publish("a", "hello").await.unwrap(), 1);
        assert_eq!(a.recv().await.unwrap(), "hello");
        assert!(b.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_without_subscribers_counts_zero() {
        let bus = MemoryPubSub::new();
        assert_eq!(bus.publish("nobody", "x").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn presence_add_remove_list() {
        let bus = MemoryPubSub::new();
        assert!(bus.presence_add("presence-online", "s1", "u1", "{}").await.unwrap());
        assert!(bus.presence_add("presence-online", "s2", "u2", "{}").await.unwrap());
        assert_eq!(
            bus.presence_remove("presence-online", "s1").await.unwrap(),
            Some("u1".to_string())
        );
        let members = bus.presence_members("presence-online").await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].0, "s2");
        // Removing an absent socket is fine.
        assert_eq!(bus.presence_remove("presence-online", "s1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn only_the_last_socket_of_a_user_reports_it() {
        let bus = MemoryPubSub::new();
        assert!(bus.presence_add("presence-online", "s1", "u1", "{}").await.unwrap());
        assert!(!bus.presence_add("presence-online", "s2", "u1", "{}").await.unwrap());
        assert_eq!(bus.presence_remove("presence-online", "s2").await.unwrap(), None);
        assert_eq!(
            bus.presence_remove("presence-online", "s1").await.unwrap(),
            Some("u1".to_string())
        );
    }

    #[tokio::test]
    async fn idle_topics_are_dropped() {
        let bus = MemoryPubSub::new();
        let a = bus.subscribe_to_channel("u1-u2").await.unwrap();
        let b = bus.subscribe_to_channel("u1-u3").await.unwrap();
        assert_eq!(bus.topic_count().await, 2);

        // Released while a receiver is alive: kept.
        bus.release_channel("u1-u2").await;
        assert_eq!(bus.topic_count().await, 2);

        drop(a);
        bus.release_channel("u1-u2").await;
        assert_eq!(bus.topic_count().await, 1);

        // A publish finding nobody listening also prunes.
        drop(b);
        assert_eq!(bus.publish("u1-u3", "x").await.unwrap(), 0);
        assert_eq!(bus.topic_count().await, 0);
    }
}
