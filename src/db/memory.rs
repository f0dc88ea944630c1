//! In-process store for local runs and tests.

use super::{BillingStore, InvoiceLocks};
use crate::domains::billing::{
    payment, EstadoFactura, Factura, FacturaChanges, FacturaFilter, Pago, PagoChanges,
};
use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use rust_decimal::Decimal;
use shared::{AppError, Result};
use std::cmp::Reverse;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct MemoryBillingStore {
    facturas: DashMap<Uuid, Factura>,
    pagos: DashMap<Uuid, Pago>,
    locks: InvoiceLocks,
}

impl MemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The invoice as it would look with payment `pago_id` replaced by
    /// `replacement`, or removed when there is none. Nothing is written.
    /// Caller holds the invoice lock.
    fn rebalanced(
        &self,
        factura_id: Uuid,
        pago_id: Uuid,
        replacement: Option<&Pago>,
    ) -> Result<Option<Factura>> {
        let Some(mut factura) = self.facturas.get(&factura_id).map(|f| f.value().clone()) else {
            return Ok(None);
        };

        let others: Decimal = self
            .pagos
            .iter()
            .filter(|p| p.factura_id == factura_id && p.pago_id != pago_id)
            .map(|p| p.monto)
            .sum();
        let replaced = replacement
            .filter(|p| p.factura_id == factura_id)
            .map_or(Decimal::ZERO, |p| p.monto);

        payment::rebalance(&mut factura, others + replaced)?;
        Ok(Some(factura))
    }

    fn newest_first(mut facturas: Vec<Factura>) -> Vec<Factura> {
        facturas.sort_by_key(|f| (Reverse(f.fecha), f.factura_id));
        facturas
    }

    fn collect_facturas(&self, keep: impl Fn(&Factura) -> bool) -> Vec<Factura> {
        Self::newest_first(
            self.facturas
                .iter()
                .filter(|f| keep(f.value()))
                .map(|f| f.value().clone())
                .collect(),
        )
    }

    /// Payment plus the invoice ids it touches, read before locking.
    fn pago_and_targets(&self, pago_id: Uuid, changes: Option<&PagoChanges>) -> Option<(Pago, Vec<Uuid>)> {
        let pago = self.pagos.get(&pago_id).map(|p| p.value().clone())?;
        let mut ids = vec![pago.factura_id];
        if let Some(target) = changes.and_then(|c| c.factura_id) {
            ids.push(target);
        }
        Some((pago, ids))
    }

    fn ensure_unmoved(&self, pago_id: Uuid, expected_factura: Uuid) -> Result<Option<Pago>> {
        match self.pagos.get(&pago_id).map(|p| p.value().clone()) {
            None => Ok(None),
            Some(current) if current.factura_id != expected_factura => Err(AppError::conflict(
                format!("Pago {} was moved concurrently, retry the request", pago_id),
            )),
            Some(current) => Ok(Some(current)),
        }
    }
}

#[async_trait]
impl BillingStore for MemoryBillingStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn list_facturas(&self, filter: &FacturaFilter) -> Result<(Vec<Factura>, i64)> {
        let needle = filter.query_lowercase();
        let matching = self.collect_facturas(|f| match &needle {
            Some(needle) => f.matches_query(needle),
            None => true,
        });

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(filter.offset().max(0) as usize)
            .take(filter.page_size.max(0) as usize)
            .collect();

        debug!(total, page = filter.page, "memory invoice listing");
        Ok((page, total))
    }

    async fn get_factura(&self, factura_id: Uuid) -> Result<Option<Factura>> {
        Ok(self.facturas.get(&factura_id).map(|f| f.value().clone()))
    }

    async fn facturas_by_client(&self, client_id: Uuid) -> Result<Vec<Factura>> {
        Ok(self.collect_facturas(|f| f.client_id == client_id))
    }

    async fn facturas_by_nit(&self, nit: &str) -> Result<Vec<Factura>> {
        Ok(self.collect_facturas(|f| f.nit == nit))
    }

    async fn latest_facturas(&self, limit: i64) -> Result<Vec<Factura>> {
        let mut latest = self.collect_facturas(|_| true);
        latest.truncate(limit.max(0) as usize);
        Ok(latest)
    }

    async fn insert_factura(&self, factura: &Factura) -> Result<Factura> {
        match self.facturas.entry(factura.factura_id) {
            Entry::Occupied(_) => Err(AppError::conflict(format!(
                "Factura {} already exists",
                factura.factura_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(factura.clone());
                Ok(factura.clone())
            }
        }
    }

    async fn update_factura(
        &self,
        factura_id: Uuid,
        changes: &FacturaChanges,
    ) -> Result<Option<Factura>> {
        let _guard = self.locks.lock(factura_id).await;

        let Some(mut stored) = self.facturas.get_mut(&factura_id) else {
            return Ok(None);
        };
        let mut updated = stored.clone();
        updated.apply_changes(changes)?;
        *stored = updated.clone();
        Ok(Some(updated))
    }

    async fn void_factura(&self, factura_id: Uuid) -> Result<Option<Factura>> {
        let _guard = self.locks.lock(factura_id).await;

        Ok(self.facturas.get_mut(&factura_id).map(|mut f| {
            f.estado = EstadoFactura::Voided;
            f.clone()
        }))
    }

    async fn delete_factura(&self, factura_id: Uuid) -> Result<Option<u64>> {
        let _guard = self.locks.lock(factura_id).await;

        if self.facturas.remove(&factura_id).is_none() {
            return Ok(None);
        }

        let pago_ids: Vec<Uuid> = self
            .pagos
            .iter()
            .filter(|p| p.factura_id == factura_id)
            .map(|p| *p.key())
            .collect();
        for pago_id in &pago_ids {
            self.pagos.remove(pago_id);
        }

        Ok(Some(pago_ids.len() as u64))
    }

    async fn list_pagos(&self) -> Result<Vec<Pago>> {
        let mut pagos: Vec<Pago> = self.pagos.iter().map(|p| p.value().clone()).collect();
        pagos.sort_by_key(|p| (Reverse(p.fecha), p.pago_id));
        Ok(pagos)
    }

    async fn get_pago(&self, pago_id: Uuid) -> Result<Option<Pago>> {
        Ok(self.pagos.get(&pago_id).map(|p| p.value().clone()))
    }

    async fn pagos_by_factura(&self, factura_id: Uuid) -> Result<Vec<Pago>> {
        let mut pagos: Vec<Pago> = self
            .pagos
            .iter()
            .filter(|p| p.factura_id == factura_id)
            .map(|p| p.value().clone())
            .collect();
        pagos.sort_by_key(|p| (p.fecha, p.pago_id));
        Ok(pagos)
    }

    async fn record_pago(&self, pago: &Pago) -> Result<Option<Factura>> {
        let _guard = self.locks.lock(pago.factura_id).await;

        let Some(mut stored) = self.facturas.get_mut(&pago.factura_id) else {
            return Ok(None);
        };

        let mut updated = stored.clone();
        payment::apply_payment(&mut updated, pago.monto)?;

        match self.pagos.entry(pago.pago_id) {
            Entry::Occupied(_) => {
                return Err(AppError::conflict(format!(
                    "Pago {} already exists",
                    pago.pago_id
                )))
            }
            Entry::Vacant(slot) => {
                slot.insert(pago.clone());
            }
        }

        *stored = updated.clone();
        Ok(Some(updated))
    }

    async fn update_pago(&self, pago_id: Uuid, changes: &PagoChanges) -> Result<Option<Pago>> {
        let Some((before, ids)) = self.pago_and_targets(pago_id, Some(changes)) else {
            return Ok(None);
        };
        let _guards = self.locks.lock_many(&ids).await;

        let Some(before) = self.ensure_unmoved(pago_id, before.factura_id)? else {
            return Ok(None);
        };

        let mut after = before.clone();
        after.apply_changes(changes);

        let target = self
            .facturas
            .get(&after.factura_id)
            .map(|f| f.value().clone())
            .ok_or_else(|| AppError::not_found(format!("Factura {}", after.factura_id)))?;
        payment::check_payment_edit(&before, &after, &target)?;

        let mut rebalanced = Vec::with_capacity(ids.len());
        for factura_id in super::lock_order(&ids) {
            rebalanced.extend(self.rebalanced(factura_id, pago_id, Some(&after))?);
        }

        self.pagos.insert(pago_id, after.clone());
        for factura in rebalanced {
            self.facturas.insert(factura.factura_id, factura);
        }

        Ok(Some(after))
    }

    async fn delete_pago(&self, pago_id: Uuid) -> Result<Option<Pago>> {
        let Some((before, ids)) = self.pago_and_targets(pago_id, None) else {
            return Ok(None);
        };
        let _guards = self.locks.lock_many(&ids).await;

        if self.ensure_unmoved(pago_id, before.factura_id)?.is_none() {
            return Ok(None);
        }

        let rebalanced = self.rebalanced(before.factura_id, pago_id, None)?;
        let removed = self.pagos.remove(&pago_id).map(|(_, p)| p);
        if let (Some(_), Some(factura)) = (&removed, rebalanced) {
            self.facturas.insert(factura.factura_id, factura);
        }
        Ok(removed)
    }
}
