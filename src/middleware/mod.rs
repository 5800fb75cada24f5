//! Request extractors shared by the HTTP handlers. Channel auth for sockets
//! happens in the WebSocket handler itself.

pub mod auth;

pub use auth::{AppKey, AuthUser};
