//! Server-side error type and its HTTP mapping.
//!
//! Only the action layer and the channel endpoints return these to callers.
//! Publishing never does: bus failures after a successful write are logged
//! by the publisher and dropped.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// Redis pub/sub or presence storage failed.
    #[error("Bus error: {0}")]
    Bus(#[from] redis::RedisError),

    /// The record store (Postgres) failed.
    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("Invalid payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid channel name: {0}")]
    InvalidChannel(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("JWT error: {0}")]
    Jwt(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Payload(_) | AppError::Validation(_) | AppError::InvalidChannel(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Auth(_) | AppError::Jwt(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Bus(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Store(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        // Client errors carry their own message; server errors keep the
        // variant prefix.
        let message = match self {
            AppError::Validation(msg)
            | AppError::InvalidChannel(msg)
            | AppError::Auth(msg)
            | AppError::Jwt(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg) => msg,
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_maps_to_403() {
        let res = AppError::Forbidden("not your channel".into()).into_response();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn validation_and_payload_map_to_400() {
        assert_eq!(AppError::Validation("empty".into()).status(), StatusCode::BAD_REQUEST);
        let bad = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(AppError::from(bad).status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn body_carries_plain_message() {
        let res = AppError::NotFound("member u9".into()).into_response();
        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "member u9");
    }
}
