pub mod common;
pub mod facturas;
pub mod pagos;

use axum::{middleware::{from_fn, from_fn_with_state}, Router};
use shared::{AuthService, Roles};
use std::sync::Arc;

use crate::middleware::{require_auth, require_role};
use crate::state::AppState;

/// Creates the API router with all REST endpoints. Every route requires an
/// authenticated caller with the admin role.
pub fn create_api_router(auth: Arc<AuthService>) -> Router<Arc<AppState>> {
    Router::new()
        .nest("/facturas", facturas::create_facturas_router())
        .nest("/pagos", pagos::create_pagos_router())
        .layer(from_fn(require_role(Roles::ADMIN)))
        .layer(from_fn_with_state(auth, require_auth))
}
