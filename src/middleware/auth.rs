//! Auth extractors: bearer session for users, app key for the broadcast API.

use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use tracing::debug;

use crate::error::AppError;
use crate::handlers::http::AppState;

pub const HEADER_APP_KEY: &str = "x-app-key";

/// Extractor: authenticated user id from the JWT bearer token.
#[derive(Clone, Debug)]
pub struct AuthUser(pub String);

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| {
                    AppError::Auth("Missing or invalid Authorization header".to_string())
                })?;
        let user_id = state.jwt_secret().validate(bearer.token())?;
        Ok(AuthUser(user_id))
    }
}

/// Extractor: caller presented the configured `x-app-key`.
#[derive(Clone, Copy, Debug)]
pub struct AppKey;

#[axum::async_trait]
impl FromRequestParts<AppState> for AppKey {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let key = parts
            .headers
            .get(HEADER_APP_KEY)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if key.is_empty() || key != state.app_key {
            debug!("rejected request: invalid or missing x-app-key");
            return Err(AppError::Auth("invalid or missing x-app-key".to_string()));
        }
        Ok(AppKey)
    }
}
