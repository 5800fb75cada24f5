//! HTTP calls the client makes to the server: channel authorization, the
//! session lookup and the unread-count seed.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Serialize;
use tracing::debug;

use super::session::SessionInfo;
use super::ClientError;
use crate::handlers::actions::UnreadCount;
use crate::handlers::http::{ChannelAuthResponse, SessionResponse};

#[derive(Serialize)]
struct ChannelAuthBody<'a> {
    socket_id: &'a str,
    channel_name: &'a str,
}

/// Bearer-authenticated client for `/api`.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl ApiClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Signature for subscribing `socket_id` to a private or presence
    /// channel. A refusal maps to [`ClientError::Unauthorized`].
    pub async fn authorize_channel(
        &self,
        socket_id: &str,
        channel: &str,
    ) -> Result<ChannelAuthResponse, ClientError> {
        let response = self
            .http
            .post(self.url("/api/channel-auth"))
            .bearer_auth(&self.token)
            .json(&ChannelAuthBody {
                socket_id,
                channel_name: channel,
            })
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                debug!(channel = %channel, "channel authorized");
                Ok(response.json().await?)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                let body = response.text().await.unwrap_or_default();
                Err(ClientError::Unauthorized(format!("{channel}: {body}")))
            }
            status => Err(ClientError::Status(status.as_u16())),
        }
    }

    pub async fn session(&self) -> Result<SessionInfo, ClientError> {
        let session: SessionResponse = self
            .http
            .get(self.url("/api/session"))
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(SessionInfo {
            user_id: Some(session.user_id),
            profile_complete: session.profile_complete,
        })
    }

    /// Authoritative unread count for seeding the counter.
    pub async fn unread_count(&self) -> Result<u32, ClientError> {
        let body: UnreadCount = self
            .http
            .get(self.url("/api/messages/unread-count"))
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let api = ApiClient::new("http://localhost:3000/", "t").unwrap();
        assert_eq!(api.url("/api/session"), "http://localhost:3000/api/session");
    }
}
