//! Authentication: validating the session token that identifies the user.

mod jwt;

pub use jwt::{Claims, JwtSecret};
