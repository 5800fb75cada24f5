//! User actions that persist and then notify: messages, likes, read receipts.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::AppError;
use crate::handlers::http::AppState;
use crate::middleware::AuthUser;
use crate::models::notification::MessageDto;

#[derive(Debug, Deserialize, Validate)]
pub struct SendMessageRequest {
    #[validate(length(min = 1, max = 128))]
    pub recipient_id: String,
    #[validate(length(min = 1, max = 2000))]
    pub text: String,
}

/// POST /api/messages
pub async fn send_message(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<SendMessageRequest>,
) -> Result<Json<MessageDto>, AppError> {
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    let message = state
        .actions
        .send_message(&user_id, &body.recipient_id, &body.text)
        .await?;
    Ok(Json(message))
}

#[derive(Debug, Deserialize, Validate)]
pub struct LikeRequest {
    #[validate(length(min = 1, max = 128))]
    pub target_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LikeResponse {
    pub is_match: bool,
    pub message: String,
}

/// POST /api/likes
pub async fn record_like(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<LikeRequest>,
) -> Result<Json<LikeResponse>, AppError> {
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    let outcome = state.actions.record_like(&user_id, &body.target_id).await?;
    let message = match (outcome.created, outcome.is_match) {
        (false, _) => "Already liked",
        (true, true) => "It's a match!",
        (true, false) => "Like sent!",
    };
    Ok(Json(LikeResponse {
        is_match: outcome.is_match,
        message: message.to_string(),
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadReceipt {
    pub message_ids: Vec<String>,
    pub read_count: usize,
}

/// POST /api/threads/:user_id/read: the caller opened their thread with `user_id`.
pub async fn mark_thread_read(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(other_id): Path<String>,
) -> Result<Json<ReadReceipt>, AppError> {
    let message_ids = state.actions.mark_thread_read(&user_id, &other_id).await?;
    Ok(Json(ReadReceipt {
        read_count: message_ids.len(),
        message_ids,
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnreadCount {
    pub count: u32,
}

/// GET /api/messages/unread-count: authoritative seed for the unread counter.
pub async fn unread_count(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<UnreadCount>, AppError> {
    let count = state.actions.unread_count(&user_id).await?;
    Ok(Json(UnreadCount { count }))
}
