// ============================================================================
// PAGOS API - payments
// ============================================================================

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use shared::AppError;
use std::sync::Arc;
use tracing::info;

use super::common::{parse_uuid, ValidJson};
use crate::domains::billing::{NewPago, Pago, PagoChanges};
use crate::middleware::CurrentUser;
use crate::state::AppState;

pub fn create_pagos_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_pagos).post(create_pago))
        .route("/factura/:factura_id", get(pagos_by_factura))
        .route(
            "/:pago_id",
            get(get_pago).put(update_pago).delete(delete_pago),
        )
}

pub async fn list_pagos(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Pago>>, AppError> {
    Ok(Json(state.billing.list_pagos().await?))
}

pub async fn get_pago(
    State(state): State<Arc<AppState>>,
    Path(pago_id): Path<String>,
) -> Result<Json<Pago>, AppError> {
    let pago_id = parse_uuid("pago_id", &pago_id)?;
    Ok(Json(state.billing.get_pago(pago_id).await?))
}

pub async fn pagos_by_factura(
    State(state): State<Arc<AppState>>,
    Path(factura_id): Path<String>,
) -> Result<Json<Vec<Pago>>, AppError> {
    let factura_id = parse_uuid("factura_id", &factura_id)?;
    Ok(Json(state.billing.pagos_by_factura(factura_id).await?))
}

/// POST /pagos - records the payment and applies it to its invoice.
pub async fn create_pago(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ValidJson(request): ValidJson<NewPago>,
) -> Result<(StatusCode, Json<Pago>), AppError> {
    let registro = state.billing.create_pago(request).await?;
    info!(
        user_id = %user.user_id,
        pago_id = %registro.pago.pago_id,
        factura_id = %registro.factura.factura_id,
        "POST /pagos"
    );
    Ok((StatusCode::CREATED, Json(registro.pago)))
}

pub async fn update_pago(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(pago_id): Path<String>,
    ValidJson(changes): ValidJson<PagoChanges>,
) -> Result<Json<Pago>, AppError> {
    let pago_id = parse_uuid("pago_id", &pago_id)?;
    let pago = state.billing.update_pago(pago_id, changes).await?;
    info!(user_id = %user.user_id, %pago_id, "PUT /pagos/:pago_id");
    Ok(Json(pago))
}

pub async fn delete_pago(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(pago_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let pago_id = parse_uuid("pago_id", &pago_id)?;
    state.billing.delete_pago(pago_id).await?;
    info!(user_id = %user.user_id, %pago_id, "DELETE /pagos/:pago_id");
    Ok(StatusCode::NO_CONTENT)
}
