//! Presence channel: track online users.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User info for presence channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceUser {
    pub user_id: String,
    pub user_info: Option<serde_json::Value>,
}

/// Stored presence member (internal). One per socket, so a user with two
/// tabs open has two members.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceMember {
    pub user_id: String,
    pub user_info: Option<serde_json::Value>,
    pub socket_id: String,
}

/// Roster sent with `subscription_succeeded` on a presence channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresenceSnapshot {
    pub ids: Vec<String>,
    pub count: usize,
}

impl PresenceSnapshot {
    /// Build from stored members, one entry per user, in first-seen order.
    pub fn from_users(users: &[PresenceUser]) -> Self {
        let mut ids: Vec<String> = Vec::with_capacity(users.len());
        for user in users {
            if !ids.iter().any(|id| id == &user.user_id) {
                ids.push(user.user_id.clone());
            }
        }
        let count = ids.len();
        Self { ids, count }
    }
}

/// Generate a unique socket/connection id.
pub fn generate_socket_id() -> String {
    format!("{}.{}", std::process::id(), Uuid::new_v4().as_simple())
}
