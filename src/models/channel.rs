//! Channel types and naming conventions.
//!
//! Channel names are the only wire contract shared between the publishing
//! server and every subscribing client, so both sides compute them here.

use serde::{Deserialize, Serialize};

const PRIVATE_PREFIX: &str = "private-";
const PRESENCE_PREFIX: &str = "presence-";

/// Shared presence channel every profile-complete, connected user joins.
pub const PRESENCE_ONLINE: &str = "presence-online";

/// Channel type based on prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    /// Public channel: no auth required.
    Public,
    /// Private channel: requires auth token.
    Private,
    /// Presence channel: auth + track who is online.
    Presence,
}

impl ChannelType {
    /// Derive channel type from name. Pusher-style: `private-*`, `presence-*`.
    pub fn from_name(name: &str) -> Self {
        if name.starts_with(PRESENCE_PREFIX) {
            ChannelType::Presence
        } else if name.starts_with(PRIVATE_PREFIX) {
            ChannelType::Private
        } else {
            ChannelType::Public
        }
    }

    pub fn is_private(&self) -> bool {
        matches!(self, ChannelType::Private | ChannelType::Presence)
    }
}

/// Per-user private channel: `private-{user_id}`.
pub fn private_channel(user_id: &str) -> String {
    format!("{}{}", PRIVATE_PREFIX, user_id)
}

/// The user id a `private-*` channel belongs to, if the name is one.
pub fn private_channel_owner(channel: &str) -> Option<&str> {
    channel
        .strip_prefix(PRIVATE_PREFIX)
        .filter(|owner| !owner.is_empty())
}

/// Two-party conversation channel. The smaller id (byte-wise) comes first so
/// both participants derive the same name without a lookup.
pub fn conversation_id(user_a: &str, user_b: &str) -> String {
    if user_a <= user_b {
        format!("{}-{}", user_a, user_b)
    } else {
        format!("{}-{}", user_b, user_a)
    }
}
