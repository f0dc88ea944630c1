// ============================================================================
// FACTURAS API - invoices
// ============================================================================

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use shared::AppError;
use std::sync::Arc;
use tracing::info;

use super::common::{parse_uuid, ValidJson};
use crate::domains::billing::{
    Factura, FacturaChanges, LatestQuery, ListFacturasQuery, NewFactura, Page,
};
use crate::middleware::CurrentUser;
use crate::state::AppState;

pub fn create_facturas_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_facturas).post(create_factura))
        .route("/latest", get(latest_facturas))
        .route("/cliente/:client_id", get(facturas_by_client))
        .route("/nit/:nit", get(facturas_by_nit))
        .route(
            "/:factura_id",
            get(get_factura).put(update_factura).delete(delete_factura),
        )
        .route("/:factura_id/anular", patch(void_factura))
}

/// GET /facturas?page&pageSize&query
pub async fn list_facturas(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListFacturasQuery>,
) -> Result<Json<Page<Factura>>, AppError> {
    Ok(Json(state.billing.list_facturas(&params).await?))
}

/// GET /facturas/latest?limit
pub async fn latest_facturas(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LatestQuery>,
) -> Result<Json<Vec<Factura>>, AppError> {
    Ok(Json(state.billing.latest_facturas(&params).await?))
}

pub async fn get_factura(
    State(state): State<Arc<AppState>>,
    Path(factura_id): Path<String>,
) -> Result<Json<Factura>, AppError> {
    let factura_id = parse_uuid("factura_id", &factura_id)?;
    Ok(Json(state.billing.get_factura(factura_id).await?))
}

pub async fn facturas_by_client(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
) -> Result<Json<Vec<Factura>>, AppError> {
    let client_id = parse_uuid("client_id", &client_id)?;
    Ok(Json(state.billing.facturas_by_client(client_id).await?))
}

pub async fn facturas_by_nit(
    State(state): State<Arc<AppState>>,
    Path(nit): Path<String>,
) -> Result<Json<Vec<Factura>>, AppError> {
    Ok(Json(state.billing.facturas_by_nit(&nit).await?))
}

pub async fn create_factura(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ValidJson(request): ValidJson<NewFactura>,
) -> Result<(StatusCode, Json<Factura>), AppError> {
    let factura = state.billing.create_factura(request).await?;
    info!(user_id = %user.user_id, factura_id = %factura.factura_id, "POST /facturas");
    Ok((StatusCode::CREATED, Json(factura)))
}

pub async fn update_factura(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(factura_id): Path<String>,
    ValidJson(changes): ValidJson<FacturaChanges>,
) -> Result<Json<Factura>, AppError> {
    let factura_id = parse_uuid("factura_id", &factura_id)?;
    let factura = state.billing.update_factura(factura_id, changes).await?;
    info!(user_id = %user.user_id, %factura_id, "PUT /facturas/:factura_id");
    Ok(Json(factura))
}

pub async fn delete_factura(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(factura_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let factura_id = parse_uuid("factura_id", &factura_id)?;
    state.billing.delete_factura(factura_id).await?;
    info!(user_id = %user.user_id, %factura_id, "DELETE /facturas/:factura_id");
    Ok(StatusCode::NO_CONTENT)
}

/// PATCH /facturas/:factura_id/anular
pub async fn void_factura(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(factura_id): Path<String>,
) -> Result<Json<Factura>, AppError> {
    let factura_id = parse_uuid("factura_id", &factura_id)?;
    let factura = state.billing.void_factura(factura_id).await?;
    info!(user_id = %user.user_id, %factura_id, "PATCH /facturas/:factura_id/anular");
    Ok(Json(factura))
}
