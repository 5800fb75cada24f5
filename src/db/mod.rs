//! Record store: the persistence calls the notification core depends on.
//!
//! The store is the system of record. Notifications only ever follow a
//! successful write here.

mod memory;
mod pool;
mod repositories;

pub use memory::MemoryRecordStore;
pub use pool::{create_pool, DbPool};
pub use repositories::PgRecordStore;

use crate::error::AppResult;
use crate::models::notification::MessageDto;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Display data for a member, used in like/match payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberCard {
    pub user_id: String,
    pub name: String,
    pub image: Option<String>,
}

/// Result of recording a like.
#[derive(Debug, Clone, PartialEq)]
pub struct LikeOutcome {
    /// `false` when the like already existed; nothing new to announce.
    pub created: bool,
    /// The target had already liked the source.
    pub is_match: bool,
    pub source: MemberCard,
    pub target: MemberCard,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn is_profile_complete(&self, user_id: &str) -> AppResult<bool>;

    /// Messages addressed to the user, unread and not deleted by them.
    async fn count_unread_messages(&self, user_id: &str) -> AppResult<i64>;

    /// Mark everything `other` sent to `reader` as read; returns the ids that flipped.
    async fn mark_thread_read(&self, reader_id: &str, other_id: &str) -> AppResult<Vec<String>>;

    async fn record_like(&self, source_id: &str, target_id: &str) -> AppResult<LikeOutcome>;

    async fn create_message(
        &self,
        sender_id: &str,
        recipient_id: &str,
        text: &str,
    ) -> AppResult<MessageDto>;
}
