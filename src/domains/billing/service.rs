use super::models::{Factura, FacturaChanges, NewFactura, NewPago, Pago, PagoChanges, ValidateRequest};
use super::pagination::{FacturaFilter, LatestQuery, ListFacturasQuery, Page};
use crate::db::BillingStore;
use shared::{AppError, Result};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// A recorded payment together with the invoice it was applied to.
#[derive(Debug, Clone)]
pub struct PagoRegistrado {
    pub pago: Pago,
    pub factura: Factura,
}

/// Validation, store access and not-found mapping for invoices and payments.
#[derive(Clone)]
pub struct BillingService {
    store: Arc<dyn BillingStore>,
}

/// Store failures are logged with their detail and surfaced as opaque
/// internal errors. Domain errors pass through.
fn store_failure(operation: &'static str) -> impl FnOnce(AppError) -> AppError {
    move |e| match e {
        AppError::Database(db) => {
            error!(operation, error = %db, "store operation failed");
            AppError::internal(format!("{} failed", operation))
        }
        other => other,
    }
}

fn factura_not_found(factura_id: Uuid) -> AppError {
    warn!(%factura_id, "factura not found");
    AppError::not_found(format!("Factura {}", factura_id))
}

fn pago_not_found(pago_id: Uuid) -> AppError {
    warn!(%pago_id, "pago not found");
    AppError::not_found(format!("Pago {}", pago_id))
}

impl BillingService {
    pub fn new(store: Arc<dyn BillingStore>) -> Self {
        Self { store }
    }

    pub async fn ping(&self) -> Result<()> {
        self.store.ping().await
    }

    pub async fn close(&self) {
        self.store.close().await;
    }

    // ------------------------------------------------------------------
    // Facturas
    // ------------------------------------------------------------------

    pub async fn list_facturas(&self, query: &ListFacturasQuery) -> Result<Page<Factura>> {
        let filter = FacturaFilter::from_query(query);
        let (rows, total) = self
            .store
            .list_facturas(&filter)
            .await
            .map_err(store_failure("list_facturas"))?;

        Ok(Page::new(rows, total, &filter))
    }

    pub async fn get_factura(&self, factura_id: Uuid) -> Result<Factura> {
        self.store
            .get_factura(factura_id)
            .await
            .map_err(store_failure("get_factura"))?
            .ok_or_else(|| factura_not_found(factura_id))
    }

    pub async fn facturas_by_client(&self, client_id: Uuid) -> Result<Vec<Factura>> {
        self.store
            .facturas_by_client(client_id)
            .await
            .map_err(store_failure("facturas_by_client"))
    }

    pub async fn facturas_by_nit(&self, nit: &str) -> Result<Vec<Factura>> {
        let nit = nit.trim();
        if nit.is_empty() {
            return Err(AppError::validation("nit", "nit must not be blank"));
        }

        self.store
            .facturas_by_nit(nit)
            .await
            .map_err(store_failure("facturas_by_nit"))
    }

    pub async fn latest_facturas(&self, query: &LatestQuery) -> Result<Vec<Factura>> {
        self.store
            .latest_facturas(query.limit())
            .await
            .map_err(store_failure("latest_facturas"))
    }

    pub async fn create_factura(&self, request: NewFactura) -> Result<Factura> {
        request.check()?;

        let factura = Factura::from_request(request);
        let created = self
            .store
            .insert_factura(&factura)
            .await
            .map_err(store_failure("create_factura"))?;

        info!(
            factura_id = %created.factura_id,
            client_id = %created.client_id,
            total = %created.total,
            "factura created"
        );
        Ok(created)
    }

    pub async fn update_factura(&self, factura_id: Uuid, changes: FacturaChanges) -> Result<Factura> {
        changes.check()?;

        let updated = self
            .store
            .update_factura(factura_id, &changes)
            .await
            .map_err(store_failure("update_factura"))?
            .ok_or_else(|| factura_not_found(factura_id))?;

        info!(%factura_id, estado = %updated.estado, saldo = %updated.saldo_pendiente, "factura updated");
        Ok(updated)
    }

    pub async fn void_factura(&self, factura_id: Uuid) -> Result<Factura> {
        let voided = self
            .store
            .void_factura(factura_id)
            .await
            .map_err(store_failure("void_factura"))?
            .ok_or_else(|| factura_not_found(factura_id))?;

        info!(%factura_id, "factura voided");
        Ok(voided)
    }

    pub async fn delete_factura(&self, factura_id: Uuid) -> Result<()> {
        let pagos_removed = self
            .store
            .delete_factura(factura_id)
            .await
            .map_err(store_failure("delete_factura"))?
            .ok_or_else(|| factura_not_found(factura_id))?;

        info!(%factura_id, pagos_removed, "factura deleted");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Pagos
    // ------------------------------------------------------------------

    pub async fn list_pagos(&self) -> Result<Vec<Pago>> {
        self.store.list_pagos().await.map_err(store_failure("list_pagos"))
    }

    pub async fn get_pago(&self, pago_id: Uuid) -> Result<Pago> {
        self.store
            .get_pago(pago_id)
            .await
            .map_err(store_failure("get_pago"))?
            .ok_or_else(|| pago_not_found(pago_id))
    }

    pub async fn pagos_by_factura(&self, factura_id: Uuid) -> Result<Vec<Pago>> {
        self.store
            .pagos_by_factura(factura_id)
            .await
            .map_err(store_failure("pagos_by_factura"))
    }

    /// Records the payment and applies it to its invoice atomically.
    pub async fn create_pago(&self, request: NewPago) -> Result<PagoRegistrado> {
        request.check()?;

        let pago = Pago::from_request(request);
        let factura = self
            .store
            .record_pago(&pago)
            .await
            .map_err(store_failure("create_pago"))?
            .ok_or_else(|| factura_not_found(pago.factura_id))?;

        info!(
            pago_id = %pago.pago_id,
            factura_id = %factura.factura_id,
            monto = %pago.monto,
            saldo = %factura.saldo_pendiente,
            estado = %factura.estado,
            "pago applied"
        );
        Ok(PagoRegistrado { pago, factura })
    }

    pub async fn update_pago(&self, pago_id: Uuid, changes: PagoChanges) -> Result<Pago> {
        changes.check()?;

        let updated = self
            .store
            .update_pago(pago_id, &changes)
            .await
            .map_err(store_failure("update_pago"))?
            .ok_or_else(|| pago_not_found(pago_id))?;

        info!(%pago_id, factura_id = %updated.factura_id, "pago updated");
        Ok(updated)
    }

    pub async fn delete_pago(&self, pago_id: Uuid) -> Result<()> {
        let removed = self
            .store
            .delete_pago(pago_id)
            .await
            .map_err(store_failure("delete_pago"))?
            .ok_or_else(|| pago_not_found(pago_id))?;

        info!(%pago_id, factura_id = %removed.factura_id, "pago deleted");
        Ok(())
    }
}
