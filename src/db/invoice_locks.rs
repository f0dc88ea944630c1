use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Keyed async mutex: one lock per invoice id, created on first use and
/// removed once the last holder or waiter lets go.
#[derive(Debug, Default)]
pub struct InvoiceLocks {
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

/// Exclusive hold on one invoice id.
#[must_use]
pub struct InvoiceGuard<'a> {
    locks: &'a InvoiceLocks,
    factura_id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for InvoiceGuard<'_> {
    fn drop(&mut self) {
        // Release first so the map holds the only reference when nobody waits.
        drop(self.guard.take());
        self.locks.forget(self.factura_id);
    }
}

impl InvoiceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, factura_id: Uuid) -> InvoiceGuard<'_> {
        // The map guard is released before awaiting.
        let mutex = self.locks.entry(factura_id).or_default().clone();
        InvoiceGuard {
            locks: self,
            factura_id,
            guard: Some(mutex.lock_owned().await),
        }
    }

    /// Locks every id in ascending order. Duplicates are locked once.
    pub async fn lock_many(&self, factura_ids: &[Uuid]) -> Vec<InvoiceGuard<'_>> {
        let mut guards = Vec::with_capacity(factura_ids.len());
        for id in super::lock_order(factura_ids) {
            guards.push(self.lock(id).await);
        }
        guards
    }

    /// Drops the entry unless someone still holds or waits on it. Entries
    /// are only created and removed under the map's shard lock, so a
    /// waiter's clone always keeps its entry alive.
    fn forget(&self, factura_id: Uuid) {
        self.locks
            .remove_if(&factura_id, |_, mutex| Arc::strong_count(mutex) == 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
