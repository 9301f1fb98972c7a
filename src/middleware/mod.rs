pub mod auth;
pub mod headers;

pub use auth::{AdminUser, AuthUser};
pub use headers::security_headers;
