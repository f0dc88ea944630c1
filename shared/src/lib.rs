//! Shared library for the billing service
//!
//! Ambient pieces every binary needs:
//! - Configuration from the environment
//! - Error taxonomy and its HTTP rendering
//! - JWT verification and role checks
//! - PostgreSQL pool bootstrap

pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use auth::{AuthService, Claims, Roles, UserContext};
pub use config::Config;
pub use database::DatabaseService;
pub use error::{AppError, FieldErrors, Result};
pub use types::*;
