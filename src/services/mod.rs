pub mod bot_check;
pub mod catalog_service;
pub mod credential_service;
pub mod login_limiter;
pub mod resolver_service;
pub mod resource_service;
pub mod seminar_service;
pub mod session_service;
