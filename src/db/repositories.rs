//! Postgres-backed record store: members, likes, messages.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::{DbPool, LikeOutcome, MemberCard, RecordStore};
use crate::error::{AppError, AppResult};
use crate::models::notification::MessageDto;

#[derive(Debug, FromRow)]
struct MemberRow {
    user_id: String,
    name: String,
    image: Option<String>,
}

impl From<MemberRow> for MemberCard {
    fn from(row: MemberRow) -> Self {
        Self {
            user_id: row.user_id,
            name: row.name,
            image: row.image,
        }
    }
}

#[derive(Debug, FromRow)]
struct MessageRow {
    id: String,
    text: String,
    created: DateTime<Utc>,
    date_read: Option<DateTime<Utc>>,
    sender_id: String,
    sender_name: String,
    sender_image: Option<String>,
    recipient_id: String,
    recipient_name: String,
    recipient_image: Option<String>,
}

impl From<MessageRow> for MessageDto {
    fn from(row: MessageRow) -> Self {
        Self {
            id: row.id,
            text: row.text,
            created: row.created,
            date_read: row.date_read,
            sender_id: row.sender_id,
            sender_name: row.sender_name,
            sender_image: row.sender_image,
            recipient_id: row.recipient_id,
            recipient_name: row.recipient_name,
            recipient_image: row.recipient_image,
        }
    }
}

#[derive(Clone)]
pub struct PgRecordStore {
    pool: DbPool,
}

impl PgRecordStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn member(&self, user_id: &str) -> AppResult<MemberCard> {
        let row = sqlx::query_as::<_, MemberRow>(
            "SELECT user_id, name, image FROM members WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(MemberCard::from)
            .ok_or_else(|| AppError::NotFound(format!("member {}", user_id)))
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn is_profile_complete(&self, user_id: &str) -> AppResult<bool> {
        let complete: Option<bool> =
            sqlx::query_scalar("SELECT profile_complete FROM members WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(complete.unwrap_or(false))
    }

    async fn count_unread_messages(&self, user_id: &str) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM messages
            WHERE recipient_id = $1 AND date_read IS NULL AND recipient_deleted = FALSE
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn mark_thread_read(&self, reader_id: &str, other_id: &str) -> AppResult<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            UPDATE messages SET date_read = now()
            WHERE sender_id = $1 AND recipient_id = $2
              AND date_read IS NULL AND recipient_deleted = FALSE
            RETURNING id
            "#,
        )
        .bind(other_id)
        .bind(reader_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn record_like(&self, source_id: &str, target_id: &str) -> AppResult<LikeOutcome> {
        let source = self.member(source_id).await?;
        let target = self.member(target_id).await?;

        let inserted: Option<String> = sqlx::query_scalar(
            r#"
            INSERT INTO likes (source_user_id, target_user_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            RETURNING source_user_id
            "#,
        )
        .bind(source_id)
        .bind(target_id)
        .fetch_optional(&self.pool)
        .await?;
        let created = inserted.is_some();

        let is_match = if created {
            sqlx::query_scalar(
                "SELECT EXISTS (SELECT 1 FROM likes WHERE source_user_id = $1 AND target_user_id = $2)",
            )
            .bind(target_id)
            .bind(source_id)
            .fetch_one(&self.pool)
            .await?
        } else {
            false
        };

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
        // Surface a missing recipient as 404 rather than a foreign key error.
        self.member(recipient_id).await?;

        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            WITH inserted AS (
                INSERT INTO messages (id, text, sender_id, recipient_id)
                VALUES ($1, $2, $3, $4)
                RETURNING id, text, created, date_read, sender_id, recipient_id
            )
            SELECT i.id, i.text, i.created, i.date_read,
                   i.sender_id, s.name AS sender_name, s.image AS sender_image,
                   i.recipient_id, r.name AS recipient_name, r.image AS recipient_image
            FROM inserted i
            JOIN members s ON s.user_id = i.sender_id
            JOIN members r ON r.user_id = i.recipient_id
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(text)
        .bind(sender_id)
        .bind(recipient_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }
}
