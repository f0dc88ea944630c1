pub mod auth;
pub mod request_limits;

pub use auth::{require_auth, require_role, CurrentUser};
pub use request_limits::request_timeout_middleware;
