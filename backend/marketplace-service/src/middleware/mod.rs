pub mod auth;

pub use auth::{IdentityMiddleware, UserId};
