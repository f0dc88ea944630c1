//! PostgreSQL-backed store.
//!
//! Balance-mutating operations run in one transaction with the affected
//! invoice rows locked (`SELECT ... FOR UPDATE`) in ascending id order.

use super::{lock_order, BillingStore};
use crate::domains::billing::{
    payment, EstadoFactura, Factura, FacturaChanges, FacturaFilter, Pago, PagoChanges,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use shared::{AppError, Result};
use sqlx::{postgres::PgRow, PgConnection, PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

const FACTURA_COLUMNS: &str = "factura_id, client_id, cliente_nombre, nit, descripcion, fecha, \
     fecha_vencimiento, total, iva, total_sin_iva, abonado, saldo_pendiente, estado";

const PAGO_COLUMNS: &str = "pago_id, factura_id, fecha, monto, monto_retenido, boleta_pago";

const SEARCH_CLAUSE: &str = "($1::text IS NULL \
     OR cliente_nombre ILIKE $1 ESCAPE '\\' \
     OR estado ILIKE $1 ESCAPE '\\' \
     OR nit ILIKE $1 ESCAPE '\\' \
     OR to_char(fecha, 'YYYY-MM-DD') ILIKE $1 ESCAPE '\\')";

#[derive(Debug, Clone)]
pub struct PgBillingStore {
    pool: PgPool,
}

impl PgBillingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::configuration(format!("Failed to run migrations: {}", e)))?;
        info!("Database migrations applied");
        Ok(())
    }
}

fn factura_from_row(row: &PgRow) -> std::result::Result<Factura, sqlx::Error> {
    let estado: String = row.try_get("estado")?;
    let estado: EstadoFactura = estado
        .parse()
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    Ok(Factura {
        factura_id: row.try_get("factura_id")?,
        client_id: row.try_get("client_id")?,
        cliente_nombre: row.try_get("cliente_nombre")?,
        nit: row.try_get("nit")?,
        descripcion: row.try_get("descripcion")?,
        fecha: row.try_get("fecha")?,
        fecha_vencimiento: row.try_get("fecha_vencimiento")?,
        total: row.try_get("total")?,
        iva: row.try_get("iva")?,
        total_sin_iva: row.try_get("total_sin_iva")?,
        abonado: row.try_get("abonado")?,
        saldo_pendiente: row.try_get("saldo_pendiente")?,
        estado,
    })
}

fn pago_from_row(row: &PgRow) -> std::result::Result<Pago, sqlx::Error> {
    Ok(Pago {
        pago_id: row.try_get("pago_id")?,
        factura_id: row.try_get("factura_id")?,
        fecha: row.try_get("fecha")?,
        monto: row.try_get("monto")?,
        monto_retenido: row.try_get("monto_retenido")?,
        boleta_pago: row.try_get("boleta_pago")?,
    })
}

fn map_facturas(rows: Vec<PgRow>) -> Result<Vec<Factura>> {
    Ok(rows
        .iter()
        .map(factura_from_row)
        .collect::<std::result::Result<Vec<_>, _>>()?)
}

fn map_pagos(rows: Vec<PgRow>) -> Result<Vec<Pago>> {
    Ok(rows
        .iter()
        .map(pago_from_row)
        .collect::<std::result::Result<Vec<_>, _>>()?)
}

/// Unique violations become `Conflict`; everything else stays a database error.
fn map_insert_error(error: sqlx::Error, what: &str) -> AppError {
    match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::conflict(format!("{} already exists", what))
        }
        _ => AppError::Database(error),
    }
}

async fn lock_factura(conn: &mut PgConnection, factura_id: Uuid) -> Result<Option<Factura>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM facturas WHERE factura_id = $1 FOR UPDATE",
        FACTURA_COLUMNS
    ))
    .bind(factura_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.as_ref().map(factura_from_row).transpose()?)
}

async fn lock_pago(conn: &mut PgConnection, pago_id: Uuid) -> Result<Option<Pago>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM pagos WHERE pago_id = $1 FOR UPDATE",
        PAGO_COLUMNS
    ))
    .bind(pago_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.as_ref().map(pago_from_row).transpose()?)
}

async fn write_balance(conn: &mut PgConnection, factura: &Factura) -> Result<()> {
    sqlx::query(
        "UPDATE facturas SET abonado = $1, saldo_pendiente = $2, estado = $3, updated_at = NOW() \
         WHERE factura_id = $4",
    )
    .bind(factura.abonado)
    .bind(factura.saldo_pendiente)
    .bind(factura.estado.as_str())
    .bind(factura.factura_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn pagos_total(conn: &mut PgConnection, factura_id: Uuid) -> Result<Decimal> {
    let total: Decimal =
        sqlx::query_scalar("SELECT COALESCE(SUM(monto), 0) FROM pagos WHERE factura_id = $1")
            .bind(factura_id)
            .fetch_one(&mut *conn)
            .await?;
    Ok(total)
}

/// Recompute one locked invoice from its payments and persist it.
async fn rebalance_locked(conn: &mut PgConnection, mut factura: Factura) -> Result<Factura> {
    let total = pagos_total(conn, factura.factura_id).await?;
    payment::rebalance(&mut factura, total)?;
    write_balance(conn, &factura).await?;
    Ok(factura)
}

/// Locks every id in `ids` (ascending) and returns the invoices found.
async fn lock_facturas(conn: &mut PgConnection, ids: &[Uuid]) -> Result<Vec<Factura>> {
    let mut locked = Vec::with_capacity(ids.len());
    for id in lock_order(ids) {
        if let Some(factura) = lock_factura(conn, id).await? {
            locked.push(factura);
        }
    }
    Ok(locked)
}

#[async_trait]
impl BillingStore for PgBillingStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("Database connection pool closed");
    }

    async fn list_facturas(&self, filter: &FacturaFilter) -> Result<(Vec<Factura>, i64)> {
        let pattern = filter.like_pattern();
        debug!(
            page = filter.page,
            page_size = filter.page_size,
            search = pattern.is_some(),
            "querying invoices"
        );

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM facturas WHERE {}",
            SEARCH_CLAUSE
        ))
        .bind(&pattern)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(&format!(
            "SELECT {} FROM facturas WHERE {} ORDER BY fecha DESC, factura_id ASC LIMIT $2 OFFSET $3",
            FACTURA_COLUMNS, SEARCH_CLAUSE
        ))
        .bind(&pattern)
        .bind(filter.page_size)
        .bind(filter.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok((map_facturas(rows)?, total))
    }

    async fn get_factura(&self, factura_id: Uuid) -> Result<Option<Factura>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM facturas WHERE factura_id = $1",
            FACTURA_COLUMNS
        ))
        .bind(factura_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(factura_from_row).transpose()?)
    }

    async fn facturas_by_client(&self, client_id: Uuid) -> Result<Vec<Factura>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM facturas WHERE client_id = $1 ORDER BY fecha DESC, factura_id ASC",
            FACTURA_COLUMNS
        ))
        .bind(client_id)
        .fetch_all(&self.pool)
        .await?;

        map_facturas(rows)
    }

    async fn facturas_by_nit(&self, nit: &str) -> Result<Vec<Factura>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM facturas WHERE nit = $1 ORDER BY fecha DESC, factura_id ASC",
            FACTURA_COLUMNS
        ))
        .bind(nit)
        .fetch_all(&self.pool)
        .await?;

        map_facturas(rows)
    }

    async fn latest_facturas(&self, limit: i64) -> Result<Vec<Factura>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM facturas ORDER BY fecha DESC, factura_id ASC LIMIT $1",
            FACTURA_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        map_facturas(rows)
    }

    async fn insert_factura(&self, factura: &Factura) -> Result<Factura> {
        let row = sqlx::query(&format!(
            "INSERT INTO facturas ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             RETURNING {}",
            FACTURA_COLUMNS, FACTURA_COLUMNS
        ))
        .bind(factura.factura_id)
        .bind(factura.client_id)
        .bind(&factura.cliente_nombre)
        .bind(&factura.nit)
        .bind(&factura.descripcion)
        .bind(factura.fecha)
        .bind(factura.fecha_vencimiento)
        .bind(factura.total)
        .bind(factura.iva)
        .bind(factura.total_sin_iva)
        .bind(factura.abonado)
        .bind(factura.saldo_pendiente)
        .bind(factura.estado.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, &format!("Factura {}", factura.factura_id)))?;

        Ok(factura_from_row(&row)?)
    }

    async fn update_factura(
        &self,
        factura_id: Uuid,
        changes: &FacturaChanges,
    ) -> Result<Option<Factura>> {
        let mut tx = self.pool.begin().await?;

        let Some(mut factura) = lock_factura(&mut tx, factura_id).await? else {
            return Ok(None);
        };
        factura.apply_changes(changes)?;

        let row = sqlx::query(&format!(
            "UPDATE facturas SET client_id = $2, cliente_nombre = $3, nit = $4, descripcion = $5, \
             fecha = $6, fecha_vencimiento = $7, total = $8, iva = $9, total_sin_iva = $10, \
             abonado = $11, saldo_pendiente = $12, estado = $13, updated_at = NOW() \
             WHERE factura_id = $1 RETURNING {}",
            FACTURA_COLUMNS
        ))
        .bind(factura.factura_id)
        .bind(factura.client_id)
        .bind(&factura.cliente_nombre)
        .bind(&factura.nit)
        .bind(&factura.descripcion)
        .bind(factura.fecha)
        .bind(factura.fecha_vencimiento)
        .bind(factura.total)
        .bind(factura.iva)
        .bind(factura.total_sin_iva)
        .bind(factura.abonado)
        .bind(factura.saldo_pendiente)
        .bind(factura.estado.as_str())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(factura_from_row(&row)?))
    }

    async fn void_factura(&self, factura_id: Uuid) -> Result<Option<Factura>> {
        let row = sqlx::query(&format!(
            "UPDATE facturas SET estado = $2, updated_at = NOW() WHERE factura_id = $1 RETURNING {}",
            FACTURA_COLUMNS
        ))
        .bind(factura_id)
        .bind(EstadoFactura::Voided.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(factura_from_row).transpose()?)
    }

    async fn delete_factura(&self, factura_id: Uuid) -> Result<Option<u64>> {
        let mut tx = self.pool.begin().await?;

        if lock_factura(&mut tx, factura_id).await?.is_none() {
            return Ok(None);
        }

        let pagos_removed = sqlx::query("DELETE FROM pagos WHERE factura_id = $1")
            .bind(factura_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query("DELETE FROM facturas WHERE factura_id = $1")
            .bind(factura_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(pagos_removed))
    }

    async fn list_pagos(&self) -> Result<Vec<Pago>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM pagos ORDER BY fecha DESC, pago_id ASC",
            PAGO_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        map_pagos(rows)
    }

    async fn get_pago(&self, pago_id: Uuid) -> Result<Option<Pago>> {
        let row = sqlx::query(&format!("SELECT {} FROM pagos WHERE pago_id = $1", PAGO_COLUMNS))
            .bind(pago_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(pago_from_row).transpose()?)
    }

    async fn pagos_by_factura(&self, factura_id: Uuid) -> Result<Vec<Pago>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM pagos WHERE factura_id = $1 ORDER BY fecha ASC, pago_id ASC",
            PAGO_COLUMNS
        ))
        .bind(factura_id)
        .fetch_all(&self.pool)
        .await?;

        map_pagos(rows)
    }

    async fn record_pago(&self, pago: &Pago) -> Result<Option<Factura>> {
        let mut tx = self.pool.begin().await?;

        let Some(mut factura) = lock_factura(&mut tx, pago.factura_id).await? else {
            return Ok(None);
        };
        payment::apply_payment(&mut factura, pago.monto)?;

        sqlx::query(&format!(
            "INSERT INTO pagos ({}) VALUES ($1, $2, $3, $4, $5, $6)",
            PAGO_COLUMNS
        ))
        .bind(pago.pago_id)
        .bind(pago.factura_id)
        .bind(pago.fecha)
        .bind(pago.monto)
        .bind(pago.monto_retenido)
        .bind(&pago.boleta_pago)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_insert_error(e, &format!("Pago {}", pago.pago_id)))?;

        write_balance(&mut tx, &factura).await?;
        tx.commit().await?;

        Ok(Some(factura))
    }

    async fn update_pago(&self, pago_id: Uuid, changes: &PagoChanges) -> Result<Option<Pago>> {
        let Some(current) = self.get_pago(pago_id).await? else {
            return Ok(None);
        };
        let target_id = changes.factura_id.unwrap_or(current.factura_id);

        let mut tx = self.pool.begin().await?;
        let locked = lock_facturas(&mut tx, &[current.factura_id, target_id]).await?;

        let Some(before) = lock_pago(&mut tx, pago_id).await? else {
            return Ok(None);
        };
        if before.factura_id != current.factura_id {
            return Err(AppError::conflict(format!(
                "Pago {} was moved concurrently, retry the request",
                pago_id
            )));
        }

        let mut after = before.clone();
        after.apply_changes(changes);

        let target = locked
            .iter()
            .find(|f| f.factura_id == after.factura_id)
            .ok_or_else(|| AppError::not_found(format!("Factura {}", after.factura_id)))?;
        payment::check_payment_edit(&before, &after, target)?;

        let row = sqlx::query(&format!(
            "UPDATE pagos SET factura_id = $2, fecha = $3, monto = $4, monto_retenido = $5, \
             boleta_pago = $6, updated_at = NOW() WHERE pago_id = $1 RETURNING {}",
            PAGO_COLUMNS
        ))
        .bind(after.pago_id)
        .bind(after.factura_id)
        .bind(after.fecha)
        .bind(after.monto)
        .bind(after.monto_retenido)
        .bind(&after.boleta_pago)
        .fetch_one(&mut *tx)
        .await?;

        for factura in locked {
            rebalance_locked(&mut tx, factura).await?;
        }

        tx.commit().await?;
        Ok(Some(pago_from_row(&row)?))
    }

    async fn delete_pago(&self, pago_id: Uuid) -> Result<Option<Pago>> {
        let Some(current) = self.get_pago(pago_id).await? else {
            return Ok(None);
        };

        let mut tx = self.pool.begin().await?;
        let locked = lock_facturas(&mut tx, &[current.factura_id]).await?;

        let Some(before) = lock_pago(&mut tx, pago_id).await? else {
            return Ok(None);
        };
        if before.factura_id != current.factura_id {
            return Err(AppError::conflict(format!(
                "Pago {} was moved concurrently, retry the request",
                pago_id
            )));
        }

        sqlx::query("DELETE FROM pagos WHERE pago_id = $1")
            .bind(pago_id)
            .execute(&mut *tx)
            .await?;

        for factura in locked {
            rebalance_locked(&mut tx, factura).await?;
        }

        tx.commit().await?;
        Ok(Some(before))
    }
}
