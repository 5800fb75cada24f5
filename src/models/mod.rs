//! Data models for channels, events, notifications, and presence.

pub mod channel;
pub mod event;
pub mod notification;
pub mod presence;

pub use channel::*;
pub use event::*;
pub use notification::*;
pub use presence::*;
