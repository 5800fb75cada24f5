//! Business logic: channel fan-out, presence, channel auth, publishing, actions.

pub mod actions;
pub mod auth;
pub mod channel;
pub mod presence;
pub mod publisher;

pub use actions::NotificationActions;
pub use auth::AuthService;
pub use channel::ChannelService;
pub use presence::PresenceService;
pub use publisher::Publisher;
