//! Presence channel: track who is online and decide when join/leave is announced.

use crate::error::{AppError, AppResult};
use crate::models::presence::{PresenceMember, PresenceSnapshot, PresenceUser};
use crate::repositories::PubSubBackend;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Presence channel operations: add/remove members, list members.
///
/// Membership is stored per socket. A user counts as joined when their first
/// socket arrives and as gone when their last socket leaves, so several tabs
/// of one user produce a single `member_added`/`member_removed` pair.
#[derive(Clone)]
pub struct PresenceService {
    backend: Arc<dyn PubSubBackend>,
}

impl PresenceService {
    pub fn new(backend: Arc<dyn PubSubBackend>) -> Self {
        Self { backend }
    }

    /// Store the member. Returns `true` when this is the user's first socket
    /// on the channel, i.e. the user just came online.
    #[instrument(skip(self, user_info))]
    pub async fn add_member(
        &self,
        channel: &str,
        socket_id: &str,
        user_id: &str,
        user_info: Option<serde_json::Value>,
    ) -> AppResult<bool> {
        let member = PresenceMember {
            user_id: user_id.to_string(),
            user_info,
            socket_id: socket_id.to_string(),
        };
        let data = serde_json::to_string(&member).map_err(AppError::from)?;
        let arrived = self
            .backend
            .presence_add(channel, socket_id, user_id, &data)
            .await?;
        info!(channel = %channel, socket_id = %socket_id, user_id = %user_id, arrived, "presence member added");
        Ok(arrived)
    }

    /// Remove the socket. Returns the user id when that was their last socket.
    #[instrument(skip(self))]
    pub async fn remove_member(&self, channel: &str, socket_id: &str) -> AppResult<Option<String>> {
        let gone = self.backend.presence_remove(channel, socket_id).await?;
        info!(channel = %channel, socket_id = %socket_id, gone = ?gone, "presence member removed");
        Ok(gone)
    }

    /// Add the member and read the roster it joins. When the roster can't be
    /// read the member is removed again, so a failed join leaves no entry.
    pub async fn join(
        &self,
        channel: &str,
        socket_id: &str,
        user_id: &str,
        user_info: Option<serde_json::Value>,
    ) -> AppResult<(bool, PresenceSnapshot)> {
        let arrived = self.add_member(channel, socket_id, user_id, user_info).await?;
        match self.snapshot(channel).await {
            Ok(snapshot) => Ok((arrived, snapshot)),
            Err(e) => {
                if let Err(undo) = self.remove_member(channel, socket_id).await {
                    warn!(channel = %channel, socket_id = %socket_id, error = %undo, "could not undo presence entry");
                }
                Err(e)
            }
        }
    }

    /// List all members currently on the channel (one entry per socket).
    pub async fn list_members(&self, channel: &str) -> AppResult<Vec<PresenceUser>> {
        Ok(self
            .members(channel)
            .await?
            .into_iter()
            .map(|m| PresenceUser {
                user_id: m.user_id,
                user_info: m.user_info,
            })
            .collect())
    }

    /// Roster for `subscription_succeeded`, one id per user.
    pub async fn snapshot(&self, channel: &str) -> AppResult<PresenceSnapshot> {
        let users = self.list_members(channel).await?;
        Ok(PresenceSnapshot::from_users(&users))
    }

    /// Sockets `user_id` currently holds on the channel.
    pub async fn user_socket_count(&self, channel: &str, user_id: &str) -> AppResult<usize> {
        Ok(self
            .members(channel)
            .await?
            .iter()
            .filter(|m| m.user_id == user_id)
            .count())
    }

    async fn members(&self, channel: &str) -> AppResult<Vec<PresenceMember>> {
        let raw = self.backend.presence_members(channel).await?;
        let mut members = Vec::with_capacity(raw.len());
        for (socket_id, data) in raw {
            match serde_json::from_str::<PresenceMember>(&data) {
                Ok(member) => members.push(member),
                Err(e) => warn!(channel = %channel, socket_id = %socket_id, error = %e, "skipping corrupt presence entry"),
            }
        }
        Ok(members)
    }
}
