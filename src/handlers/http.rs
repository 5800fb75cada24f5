//! HTTP handlers: broadcast trigger, channel authorization, session, health.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use validator::Validate;

use crate::auth::JwtSecret;
use crate::db::RecordStore;
use crate::error::AppError;
use crate::middleware::{AppKey, AuthUser};
use crate::models::channel::{private_channel_owner, ChannelType, PRESENCE_ONLINE};
use crate::models::event::BroadcastRequest;
use crate::repositories::PubSubBackend;
use crate::services::{AuthService, ChannelService, NotificationActions, PresenceService, Publisher};

/// Shared application state for HTTP and WS.
#[derive(Clone)]
pub struct AppState {
    pub app_key: String,
    pub channel_service: ChannelService,
    pub auth_service: AuthService,
    pub presence_service: PresenceService,
    pub actions: NotificationActions,
    pub jwt_secret: JwtSecret,
}

impl AppState {
    /// Wire services over one bus backend and record store. `publisher` is
    /// usually `Publisher::spawn` on the same channel service.
    pub fn new(
        backend: Arc<dyn PubSubBackend>,
        store: Arc<dyn RecordStore>,
        publisher: Option<Publisher>,
        app_key: String,
        app_secret: String,
        jwt_secret: JwtSecret,
    ) -> Self {
        let channel_service = ChannelService::new(backend.clone());
        let publisher = publisher.unwrap_or_else(|| Publisher::spawn(channel_service.clone()));
        Self {
            app_key,
            channel_service,
            auth_service: AuthService::new(app_secret),
            presence_service: PresenceService::new(backend),
            actions: NotificationActions::new(store, publisher),
            jwt_secret,
        }
    }

    pub fn jwt_secret(&self) -> &JwtSecret {
        &self.jwt_secret
    }
    pub fn auth_service(&self) -> &AuthService {
        &self.auth_service
    }
    pub fn presence_service(&self) -> &PresenceService {
        &self.presence_service
    }
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        self.actions.store()
    }
}

/// POST /api/broadcast: trigger an event on a channel. Requires `x-app-key`.
pub async fn broadcast(
    State(state): State<AppState>,
    _key: AppKey,
    Json(body): Json<BroadcastRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if body.channel.trim().is_empty() {
        return Err(AppError::InvalidChannel("channel is required".to_string()));
    }
    let count = state
        .channel_service
        .broadcast(&body.channel, &body.event, body.data)
        .await?;

    Ok(Json(json!({
        "ok": true,
        "channel": body.channel,
        "event": body.event,
        "subscriber_count": count
    })))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChannelAuthRequest {
    #[validate(length(min = 1, max = 128))]
    pub socket_id: String,
    #[validate(length(min = 1, max = 200))]
    pub channel_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChannelAuthResponse {
    pub auth: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_data: Option<String>,
}

/// POST /api/channel-auth: sign a private/presence subscription for the
/// authenticated user. Only the owner may join `private-{id}`; only
/// profile-complete users may join the presence channel.
pub async fn channel_auth(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<ChannelAuthRequest>,
) -> Result<Json<ChannelAuthResponse>, AppError> {
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    let channel = body.channel_name.as_str();

    let response = match ChannelType::from_name(channel) {
        ChannelType::Public => {
            return Err(AppError::InvalidChannel(format!(
                "{} is public and needs no auth",
                channel
            )))
        }
        ChannelType::Private => {
            if private_channel_owner(channel) != Some(user_id.as_str()) {
                return Err(AppError::Forbidden(format!(
                    "not allowed to subscribe to {}",
                    channel
                )));
            }
            ChannelAuthResponse {
                auth: state
                    .auth_service()
                    .sign_channel(&body.socket_id, channel, None)?,
                channel_data: None,
            }
        }
        ChannelType::Presence => {
            if channel != PRESENCE_ONLINE {
                return Err(AppError::NotFound(format!("presence channel {}", channel)));
            }
            if !state.store().is_profile_complete(&user_id).await? {
                return Err(AppError::Forbidden("profile incomplete".to_string()));
            }
            let channel_data = json!({ "user_id": user_id }).to_string();
            ChannelAuthResponse {
                auth: state.auth_service().sign_channel(
                    &body.socket_id,
                    channel,
                    Some(&channel_data),
                )?,
                channel_data: Some(channel_data),
            }
        }
    };

    info!(user_id = %user_id, channel = %channel, "channel authorized");
    Ok(Json(response))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub user_id: String,
    pub profile_complete: bool,
}

/// GET /api/session: who the bearer token belongs to and whether their
/// profile allows private/presence subscriptions.
pub async fn session(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<SessionResponse>, AppError> {
    let profile_complete = state.store().is_profile_complete(&user_id).await?;
    Ok(Json(SessionResponse {
        user_id,
        profile_complete,
    }))
}

/// GET /health: liveness probe.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "spark-notify",
            "channels": state.channel_service.active_channels().await
        })),
    )
}
