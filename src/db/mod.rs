//! Storage for invoices and payments.
//!
//! Every balance-mutating operation is atomic per invoice: implementations
//! serialize work on the same invoice id and either apply all row changes of
//! an operation or none of them.

pub mod invoice_locks;
pub mod memory;
pub mod postgres;

pub use invoice_locks::InvoiceLocks;
pub use memory::MemoryBillingStore;
pub use postgres::PgBillingStore;

use crate::domains::billing::{Factura, FacturaChanges, FacturaFilter, Pago, PagoChanges};
use async_trait::async_trait;
use shared::Result;
use uuid::Uuid;

#[async_trait]
pub trait BillingStore: Send + Sync {
    /// Cheap liveness probe for `/health`.
    async fn ping(&self) -> Result<()>;

    /// Release connections on shutdown. Later calls fail.
    async fn close(&self) {}

    /// One page of invoices plus the total number of matching rows.
    async fn list_facturas(&self, filter: &FacturaFilter) -> Result<(Vec<Factura>, i64)>;
    async fn get_factura(&self, factura_id: Uuid) -> Result<Option<Factura>>;
    async fn facturas_by_client(&self, client_id: Uuid) -> Result<Vec<Factura>>;
    async fn facturas_by_nit(&self, nit: &str) -> Result<Vec<Factura>>;
    async fn latest_facturas(&self, limit: i64) -> Result<Vec<Factura>>;

    /// Fails with `Conflict` when the id is taken.
    async fn insert_factura(&self, factura: &Factura) -> Result<Factura>;
    async fn update_factura(
        &self,
        factura_id: Uuid,
        changes: &FacturaChanges,
    ) -> Result<Option<Factura>>;
    async fn void_factura(&self, factura_id: Uuid) -> Result<Option<Factura>>;
    /// Deletes the invoice and its payments. Returns how many payments went with it.
    async fn delete_factura(&self, factura_id: Uuid) -> Result<Option<u64>>;

    async fn list_pagos(&self) -> Result<Vec<Pago>>;
    async fn get_pago(&self, pago_id: Uuid) -> Result<Option<Pago>>;
    async fn pagos_by_factura(&self, factura_id: Uuid) -> Result<Vec<Pago>>;

    /// Inserts the payment and applies it to its invoice. `None` when the
    /// invoice does not exist.
    async fn record_pago(&self, pago: &Pago) -> Result<Option<Factura>>;
    /// Updates the payment and rebalances every invoice it touches.
    async fn update_pago(&self, pago_id: Uuid, changes: &PagoChanges) -> Result<Option<Pago>>;
    /// Deletes the payment and rebalances its invoice.
    async fn delete_pago(&self, pago_id: Uuid) -> Result<Option<Pago>>;
}

/// Invoice ids touched by moving a payment, sorted and deduplicated so that
/// locks are always taken in the same order.
pub(crate) fn lock_order(ids: &[Uuid]) -> Vec<Uuid> {
    let mut ids = ids.to_vec();
    ids.sort();
    ids.dedup();
    ids
}
