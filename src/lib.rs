use axum::{extract::DefaultBodyLimit, routing::get, Router};
use std::sync::Arc;
use tower_http::compression::{predicate::SizeAbove, CompressionLayer};
use tower_http::trace::TraceLayer;

pub mod api;
pub mod db;
pub mod domains;
pub mod middleware;
pub mod security;
pub mod state;

use api::{common::health_check_handler, create_api_router};
use middleware::request_timeout_middleware;
use security::{get_cors_layer, security_headers_middleware};
use shared::Config;
use state::AppState;

use axum::middleware as axum_middleware;

pub fn create_app_router(app_state: Arc<AppState>, config: &Config) -> Router {
    let api_router = create_api_router(app_state.auth.clone());

    Router::new()
        // Sin autenticación
        .route("/health", get(health_check_handler))
        .merge(api_router)
        .with_state(app_state)
        .layer(axum_middleware::from_fn(request_timeout_middleware))
        .layer(DefaultBodyLimit::max(config.app.max_request_size_kb * 1024))
        .layer(
            CompressionLayer::new()
                .gzip(true)
                .compress_when(SizeAbove::new(1024)),
        )
        .layer(TraceLayer::new_for_http())
        .layer(get_cors_layer(config))
        .layer(axum_middleware::from_fn(security_headers_middleware))
}
