//! HTTP and WebSocket request handlers.

pub mod actions;
pub mod http;
pub mod ws;

pub use actions::*;
pub use http::*;
pub use ws::*;
