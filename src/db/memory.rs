//! In-memory record store for single-node development and tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{LikeOutcome, MemberCard, RecordStore};
use crate::error::{AppError, AppResult};
use crate::models::notification::MessageDto;

#[derive(Debug, Clone)]
struct StoredMessage {
    dto: MessageDto,
    recipient_deleted: bool,
}

#[derive(Default)]
struct Records {
    members: HashMap<String, (MemberCard, bool)>,
    likes: HashSet<(String, String)>,
    messages: Vec<StoredMessage>,
}

#[derive(Clone, Default)]
pub struct MemoryRecordStore {
    records: Arc<RwLock<Records>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a member.
    pub async fn upsert_member(&self, card: MemberCard, profile_complete: bool) {
        let mut records = self.records.write().await;
        records
            .members
            .insert(card.user_id.clone(), (card, profile_complete));
    }

    /// Hide a message from its recipient (it stops counting as unread).
    pub async fn delete_for_recipient(&self, message_id: &str) {
        let mut records = self.records.write().await;
        if let Some(m) = records.messages.iter_mut().find(|m| m.dto.id == message_id) {
            m.recipient_deleted = true;
        }
    }

    fn card(records: &Records, user_id: &str) -> AppResult<MemberCard> {
        records
            .members
            .get(user_id)
            .map(|(card, _)| card.clone())
            .ok_or_else(|| AppError::NotFound(format!("member {}", user_id)))
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn is_profile_complete(&self, user_id: &str) -> AppResult<bool> {
        let records = self.records.read().await;
        Ok(records
            .members
            .get(user_id)
            .map(|(_, complete)| *complete)
            .unwrap_or(false))
    }

    async fn count_unread_messages(&self, user_id: &str) -> AppResult<i64> {
        let records = self.records.read().await;
        let count = records
            .messages
            .iter()
            .filter(|m| {
                m.dto.recipient_id == user_id && m.dto.date_read.is_none() && !m.recipient_deleted
            })
            .count();
        Ok(count as i64)
    }

    async fn mark_thread_read(&self, reader_id: &str, other_id: &str) -> AppResult<Vec<String>> {
        let mut records = self.records.write().await;
        let now = Utc::now();
        let mut ids = Vec::new();
        for m in records.messages.iter_mut() {
            if m.dto.sender_id == other_id
                && m.dto.recipient_id == reader_id
                && m.dto.date_read.is_none()
                && !m.recipient_deleted
            {
                m.dto.date_read = Some(now);
                ids.push(m.dto.id.clone());
            }
        }
        Ok(ids)
    }

    async fn record_like(&self, source_id: &str, target_id: &str) -> AppResult<LikeOutcome> {
        let mut records = self.records.write().await;
        let source = Self::card(&records, source_id)?;
        let target = Self::card(&records, target_id)?;

        let created = records
            .likes
            .insert((source_id.to_string(), target_id.to_string()));
        let is_match = created
            && records
                .likes
                .contains(&(target_id.to_string(), source_id.to_string()));

        Ok(LikeOutcome {
            created,
            is_match,
            source,
            target,
        })
    }

    async fn create_message(
        &self,
        sender_id: &str,
        recipient_id: &str,
        text: &str,
    ) -> AppResult<MessageDto> {
        let mut records = self.records.write().await;
        let sender = Self::card(&records, sender_id)?;
        let recipient = Self::card(&records, recipient_id)?;

        let dto = MessageDto {
            id: Uuid::new_v4().to_string(),
            text: text.to_string(),
            created: Utc::now(),
            date_read: None,
            sender_id: sender.user_id,
            sender_name: sender.name,
            sender_image: sender.image,
            recipient_id: recipient.user_id,
            recipient_name: recipient.name,
            recipient_image: recipient.image,
        };
        records.messages.push(StoredMessage {
            dto: dto.clone(),
            recipient_deleted: false,
        });
        Ok(dto)
    }
}
