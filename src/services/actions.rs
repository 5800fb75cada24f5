//! Action layer: persist the domain fact, then announce it.
//!
//! Every method writes through the record store first. Only after the write
//! succeeded are events queued on the publisher, which cannot fail or undo
//! the write.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::db::{LikeOutcome, RecordStore};
use crate::error::{AppError, AppResult};
use crate::models::channel::{conversation_id, private_channel};
use crate::models::notification::{
    LikeNotification, MatchNotification, MessageDto, NotificationEvent,
};
use crate::services::Publisher;

/// Longest accepted message body, in characters.
pub const MAX_MESSAGE_LEN: usize = 2000;

#[derive(Clone)]
pub struct NotificationActions {
    store: Arc<dyn RecordStore>,
    publisher: Publisher,
}

impl NotificationActions {
    pub fn new(store: Arc<dyn RecordStore>, publisher: Publisher) -> Self {
        Self { store, publisher }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Persist a message, then publish `message:new` to the conversation
    /// channel and to the recipient's private channel. The two deliveries are
    /// independent; losing one does not affect the other.
    #[instrument(skip(self, text))]
    pub async fn send_message(
        &self,
        sender_id: &str,
        recipient_id: &str,
        text: &str,
    ) -> AppResult<MessageDto> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::Validation("Message text is required".to_string()));
        }
        if text.chars().count() > MAX_MESSAGE_LEN {
            return Err(AppError::Validation(format!(
                "Message must be at most {} characters",
                MAX_MESSAGE_LEN
            )));
        }
        if sender_id == recipient_id {
            return Err(AppError::Validation("Cannot message yourself".to_string()));
        }

        let message = self
            .store
            .create_message(sender_id, recipient_id, text)
            .await?;

        let event = NotificationEvent::MessageNew(message.clone());
        self.publisher
            .publish_event(&conversation_id(sender_id, recipient_id), &event);
        self.publisher
            .publish_event(&private_channel(recipient_id), &event);

        info!(message_id = %message.id, "message created");
        Ok(message)
    }

    /// Persist a like. A new like is announced to the target; if it
    /// completed a match both sides also get `match:new` naming the other.
    #[instrument(skip(self))]
    pub async fn record_like(&self, source_id: &str, target_id: &str) -> AppResult<LikeOutcome> {
        if source_id == target_id {
            return Err(AppError::Validation("Cannot like yourself".to_string()));
        }

        let outcome = self.store.record_like(source_id, target_id).await?;
        if !outcome.created {
            return Ok(outcome);
        }

        self.publisher.publish_event(
            &private_channel(target_id),
            &NotificationEvent::LikeNew(LikeNotification {
                user_id: outcome.source.user_id.clone(),
                name: outcome.source.name.clone(),
                image: outcome.source.image.clone(),
            }),
        );

        if outcome.is_match {
            self.publisher.publish_event(
                &private_channel(target_id),
                &NotificationEvent::MatchNew(MatchNotification {
                    user_id: outcome.source.user_id.clone(),
                    name: outcome.source.name.clone(),
                    image: outcome.source.image.clone(),
                }),
            );
            self.publisher.publish_event(
                &private_channel(source_id),
                &NotificationEvent::MatchNew(MatchNotification {
                    user_id: outcome.target.user_id.clone(),
                    name: outcome.target.name.clone(),
                    image: outcome.target.image.clone(),
                }),
            );
            info!("like completed a match");
        }
        Ok(outcome)
    }

    /// Mark what `other` sent to `reader` as read and tell the open thread
    /// views via `messages:read` on the conversation channel.
    #[instrument(skip(self))]
    pub async fn mark_thread_read(&self, reader_id: &str, other_id: &str) -> AppResult<Vec<String>> {
        let ids = self.store.mark_thread_read(reader_id, other_id).await?;
        if !ids.is_empty() {
            self.publisher.publish_event(
                &conversation_id(reader_id, other_id),
                &NotificationEvent::MessagesRead(ids.clone()),
            );
        }
        Ok(ids)
    }

    /// Authoritative unread count used to seed client counters.
    pub async fn unread_count(&self, user_id: &str) -> AppResult<u32> {
        let count = self.store.count_unread_messages(user_id).await?;
        Ok(u32::try_from(count.max(0)).unwrap_or(u32::MAX))
    }
}
