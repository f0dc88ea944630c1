use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request, State},
    http::StatusCode,
    Json,
};
use serde::de::DeserializeOwned;
use shared::{AppError, DependencyStatus, HealthStatus, ServiceStatus};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;
use uuid::Uuid;

use crate::state::AppState;

pub const SERVICE_NAME: &str = "facturacion-ws";

/// JSON body extractor whose rejections render as validation errors.
#[derive(Debug, Clone)]
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ValidJson(value)),
            Err(rejection) => Err(json_rejection_to_error(rejection)),
        }
    }
}

fn json_rejection_to_error(rejection: JsonRejection) -> AppError {
    let text = rejection.body_text();
    warn!(status = %rejection.status(), detail = %text, "rejected request body");

    match rejection {
        JsonRejection::MissingJsonContentType(_) => {
            AppError::validation("body", "Expected Content-Type: application/json")
        }
        JsonRejection::JsonSyntaxError(_) => AppError::validation("body", "Malformed JSON body"),
        _ => AppError::validation(field_from_rejection(&text), body_problem(&text)),
    }
}

/// Field named by a deserialization failure, or `body` when none is given.
pub fn field_from_rejection(text: &str) -> String {
    let detail = body_problem(text);

    if let Some(rest) = detail.split("missing field `").nth(1) {
        if let Some(field) = rest.split('`').next() {
            return field.to_string();
        }
    }

    if let Some((path, _)) = detail.split_once(": ") {
        let is_path = !path.is_empty()
            && path
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '[' | ']'));
        if is_path {
            return path.to_string();
        }
    }

    "body".to_string()
}

fn body_problem(text: &str) -> &str {
    text.rsplit_once("target type: ")
        .map(|(_, detail)| detail)
        .unwrap_or(text)
}

/// Parse a UUID path segment, naming the segment on failure.
pub fn parse_uuid(field: &str, raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::validation(field, format!("{} must be a valid UUID", field)))
}

/// Liveness plus a store round-trip.
pub async fn health_check_handler(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthStatus>) {
    let started = Instant::now();
    let storage = match state.billing.ping().await {
        Ok(()) => DependencyStatus {
            name: "storage".to_string(),
            status: ServiceStatus::Healthy,
            response_time_ms: Some(started.elapsed().as_millis() as u64),
            error: None,
        },
        Err(e) => {
            warn!(error = %e, "storage health check failed");
            DependencyStatus {
                name: "storage".to_string(),
                status: ServiceStatus::Unhealthy,
                response_time_ms: Some(started.elapsed().as_millis() as u64),
                error: Some(e.public_message()),
            }
        }
    };

    let health = HealthStatus::from_dependencies(SERVICE_NAME, vec![storage]);
    let status = if health.status == ServiceStatus::Healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(health))
}
