//! HTTP route handlers
//!
//! Each module owns one path prefix and exposes a `handle_*_request`
//! entry point that consumes the request when the prefix matches.

pub mod auth_routes;
pub mod chat;
pub mod chat_ws;
pub mod diary;
pub mod friends;
pub mod health;
pub mod helpers;
pub mod plans;
pub mod resources;
pub mod users;

pub use auth_routes::handle_auth_request;
pub use chat::handle_chat_request;
pub use diary::handle_diary_request;
pub use friends::handle_friends_request;
pub use health::{health_check, version_info};
pub use plans::handle_plan_request;
pub use resources::handle_resources_request;
pub use users::handle_users_request;
