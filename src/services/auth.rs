//! Authentication for private and presence channels (Pusher-compatible HMAC).

use crate::error::{AppError, AppResult};
use crate::models::channel::ChannelType;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Signs and validates auth signatures for private/presence channels.
/// Pusher-style: HMAC-SHA256(app_secret, socket_id:channel_name[:channel_data]).
#[derive(Clone)]
pub struct AuthService {
    app_secret: String,
}

impl AuthService {
    pub fn new(app_secret: String) -> Self {
        Self { app_secret }
    }

    fn mac_for(
        &self,
        socket_id: &str,
        channel: &str,
        channel_data: Option<&str>,
    ) -> AppResult<HmacSha256> {
        let sign_payload = if ChannelType::from_name(channel) == ChannelType::Presence {
            format!("{}:{}:{}", socket_id, channel, channel_data.unwrap_or(""))
        } else {
            format!("{}:{}", socket_id, channel)
        };
        let mut mac = HmacSha256::new_from_slice(self.app_secret.as_bytes())
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init: {}", e)))?;
        mac.update(sign_payload.as_bytes());
        Ok(mac)
    }

    /// Verify that the client is allowed to subscribe to the channel.
    /// For private: auth = HMAC(socket_id:channel_name).
    /// For presence: auth = HMAC(socket_id:channel_name:channel_data).
    pub fn verify_channel_auth(
        &self,
        channel: &str,
        socket_id: &str,
        auth: Option<&str>,
        channel_data: Option<&str>,
    ) -> AppResult<()> {
        if !ChannelType::from_name(channel).is_private() {
            return Ok(());
        }

        let auth = auth.ok_or_else(|| {
            AppError::Auth("missing auth for private/presence channel".to_string())
        })?;
        let signature = hex::decode(auth)
            .map_err(|_| AppError::Auth("invalid auth signature".to_string()))?;

        self.mac_for(socket_id, channel, channel_data)?
            .verify_slice(&signature)
            .map_err(|_| {
                debug!(channel = %channel, "auth signature mismatch");
                AppError::Auth("invalid auth signature".to_string())
            })
    }

    /// Generate auth signature, handed to an authorized client by `/api/channel-auth`.
    pub fn sign_channel(
        &self,
        socket_id: &str,
        channel: &str,
        channel_data: Option<&str>,
    ) -> AppResult<String> {
        let mac = self.mac_for(socket_id, channel, channel_data)?;
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}
