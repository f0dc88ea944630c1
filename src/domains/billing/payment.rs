//! Balance rules tying an invoice to the payments recorded against it.
//!
//! Callers hold the invoice exclusively (row lock or keyed mutex) while
//! these run, so the read-modify-write below is never interleaved.

use super::models::{money_limit, EstadoFactura, Factura, Pago};
use rust_decimal::Decimal;
use shared::{AppError, Result};

/// Apply a new payment of `monto` to `factura`. On error `factura` is untouched.
pub fn apply_payment(factura: &mut Factura, monto: Decimal) -> Result<()> {
    ensure_accepts_payments(factura)?;

    let abonado = factura.abonado + monto;
    let saldo = factura.total - abonado;
    ensure_storable(factura, abonado, saldo)?;

    factura.abonado = abonado;
    factura.saldo_pendiente = saldo;
    if factura.saldo_pendiente <= Decimal::ZERO {
        factura.estado = EstadoFactura::Paid;
    }

    Ok(())
}

/// Recompute the running totals from the sum of the invoice's payments.
///
/// A paid invoice whose balance reopens goes back to pending; a voided
/// invoice keeps its status.
pub fn rebalance(factura: &mut Factura, pagos_total: Decimal) -> Result<()> {
    let saldo = factura.total - pagos_total;
    ensure_storable(factura, pagos_total, saldo)?;

    factura.abonado = pagos_total;
    factura.saldo_pendiente = saldo;
    if !factura.is_voided() {
        factura.estado = EstadoFactura::for_balance(factura.saldo_pendiente);
    }

    Ok(())
}

/// Running totals have to fit the same NUMERIC(14,2) columns as any amount.
fn ensure_storable(factura: &Factura, abonado: Decimal, saldo: Decimal) -> Result<()> {
    let limit = money_limit();
    if abonado.abs() >= limit || saldo.abs() >= limit {
        return Err(AppError::validation(
            "monto",
            format!(
                "Payments on factura {} would exceed the largest storable amount",
                factura.factura_id
            ),
        ));
    }
    Ok(())
}

pub fn ensure_accepts_payments(factura: &Factura) -> Result<()> {
    if factura.is_voided() {
        return Err(AppError::conflict(format!(
            "Factura {} is voided and does not accept payments",
            factura.factura_id
        )));
    }
    Ok(())
}

/// A payment edit needs the target invoice to accept payments when it moves
/// the payment or changes its amount.
pub fn check_payment_edit(before: &Pago, after: &Pago, target: &Factura) -> Result<()> {
    if before.factura_id != after.factura_id || before.monto != after.monto {
        ensure_accepts_payments(target)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn factura(total: i64) -> Factura {
        Factura {
            factura_id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            cliente_nombre: "Acme SA".to_string(),
            nit: "1234567-8".to_string(),
            descripcion: None,
            fecha: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            fecha_vencimiento: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            total: Decimal::from(total),
            iva: Decimal::ZERO,
            total_sin_iva: Decimal::from(total),
            abonado: Decimal::ZERO,
            saldo_pendiente: Decimal::from(total),
            estado: EstadoFactura::Pending,
        }
    }

    fn pago(factura_id: Uuid, monto: &str) -> Pago {
        Pago {
            pago_id: Uuid::new_v4(),
            factura_id,
            fecha: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
            monto: monto.parse().unwrap(),
            monto_retenido: Decimal::ZERO,
            boleta_pago: "B-1".to_string(),
        }
    }

    #[test]
    fn test_apply_payment_keeps_balance_invariant() {
        let mut f = factura(1000);
        let before = f.clone();
        let monto: Decimal = "250.75".parse().unwrap();

        apply_payment(&mut f, monto).unwrap();

        assert_eq!(f.abonado, before.abonado + monto);
        assert_eq!(f.saldo_pendiente, before.total - f.abonado);
        assert_eq!(f.estado, EstadoFactura::Pending);
    }

    #[test]
    fn test_status_flips_to_paid_exactly_at_zero() {
        let mut f = factura(1000);
        apply_payment(&mut f, "999.99".parse().unwrap()).unwrap();
        assert_eq!(f.estado, EstadoFactura::Pending);

        apply_payment(&mut f, "0.01".parse().unwrap()).unwrap();
        assert_eq!(f.saldo_pendiente, Decimal::ZERO);
        assert_eq!(f.estado, EstadoFactura::Paid);
    }

    #[test]
    fn test_overpayment_is_paid_with_negative_balance() {
        let mut f = factura(100);
        apply_payment(&mut f, Decimal::from(150)).unwrap();

        assert_eq!(f.saldo_pendiente, Decimal::from(-50));
        assert_eq!(f.estado, EstadoFactura::Paid);
    }

    #[test]
    fn test_many_small_payments_do_not_drift() {
        let mut f = factura(1);
        for _ in 0..10 {
            apply_payment(&mut f, "0.10".parse().unwrap()).unwrap();
        }
        assert_eq!(f.saldo_pendiente, Decimal::ZERO);
        assert_eq!(f.estado, EstadoFactura::Paid);
    }

    #[test]
    fn test_voided_invoice_rejects_payment() {
        let mut f = factura(100);
        f.estado = EstadoFactura::Voided;

        let error = apply_payment(&mut f, Decimal::from(10)).unwrap_err();
        assert!(matches!(error, AppError::Conflict { .. }));
        assert_eq!(f.abonado, Decimal::ZERO);
    }

    #[test]
    fn test_accumulated_payments_must_stay_storable() {
        let mut f = factura(1000);
        let big: Decimal = "900000000000".parse().unwrap();
        apply_payment(&mut f, big).unwrap();

        let error = apply_payment(&mut f, big).unwrap_err();
        assert!(matches!(error, AppError::Validation { .. }));
        assert_eq!(f.abonado, big);
        assert_eq!(f.saldo_pendiente, Decimal::from(1000) - big);

        let error = rebalance(&mut f, big * Decimal::from(2)).unwrap_err();
        assert!(matches!(error, AppError::Validation { .. }));
        assert_eq!(f.abonado, big);
    }

    #[test]
    fn test_rebalance_reopens_paid_invoice() {
        let mut f = factura(100);
        apply_payment(&mut f, Decimal::from(100)).unwrap();
        assert_eq!(f.estado, EstadoFactura::Paid);

        let remaining = vec![pago(f.factura_id, "40")];
        rebalance(&mut f, remaining.iter().map(|p| p.monto).sum()).unwrap();

        assert_eq!(f.abonado, Decimal::from(40));
        assert_eq!(f.saldo_pendiente, Decimal::from(60));
        assert_eq!(f.estado, EstadoFactura::Pending);
    }

    #[test]
    fn test_rebalance_keeps_voided_status() {
        let mut f = factura(100);
        f.estado = EstadoFactura::Voided;

        rebalance(&mut f, Decimal::from(100)).unwrap();
        assert_eq!(f.saldo_pendiente, Decimal::ZERO);
        assert_eq!(f.estado, EstadoFactura::Voided);
    }

    #[test]
    fn test_payment_edit_on_voided_invoice() {
        let mut target = factura(100);
        target.estado = EstadoFactura::Voided;
        let before = pago(target.factura_id, "10");

        let mut relabelled = before.clone();
        relabelled.boleta_pago = "B-2".to_string();
        assert!(check_payment_edit(&before, &relabelled, &target).is_ok());

        let mut bigger = before.clone();
        bigger.monto = Decimal::from(20);
        assert!(check_payment_edit(&before, &bigger, &target).is_err());
    }
}
