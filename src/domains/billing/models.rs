use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{error::format_validation_errors, AppError, FieldErrors, Result};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

/// Decimal places carried by every monetary column (`NUMERIC(14,2)`).
pub const MONEY_SCALE: u32 = 2;

/// Amounts must stay below this magnitude to fit `NUMERIC(14,2)`.
pub(crate) fn money_limit() -> Decimal {
    Decimal::from(1_000_000_000_000_i64)
}

// ============================================================================
// ESTADO
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstadoFactura {
    Pending,
    Paid,
    Voided,
}

impl EstadoFactura {
    pub fn as_str(&self) -> &'static str {
        match self {
            EstadoFactura::Pending => "pending",
            EstadoFactura::Paid => "paid",
            EstadoFactura::Voided => "voided",
        }
    }

    /// Status implied by an outstanding balance.
    pub fn for_balance(saldo_pendiente: Decimal) -> Self {
        if saldo_pendiente <= Decimal::ZERO {
            EstadoFactura::Paid
        } else {
            EstadoFactura::Pending
        }
    }
}

impl fmt::Display for EstadoFactura {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown invoice status '{0}'")]
pub struct ParseEstadoError(pub String);

impl FromStr for EstadoFactura {
    type Err = ParseEstadoError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(EstadoFactura::Pending),
            "paid" => Ok(EstadoFactura::Paid),
            "voided" => Ok(EstadoFactura::Voided),
            other => Err(ParseEstadoError(other.to_string())),
        }
    }
}

// ============================================================================
// ENTITIES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factura {
    pub factura_id: Uuid,
    pub client_id: Uuid,
    pub cliente_nombre: String,
    pub nit: String,
    pub descripcion: Option<String>,
    pub fecha: NaiveDate,
    pub fecha_vencimiento: NaiveDate,
    pub total: Decimal,
    pub iva: Decimal,
    pub total_sin_iva: Decimal,
    pub abonado: Decimal,
    pub saldo_pendiente: Decimal,
    pub estado: EstadoFactura,
}

impl Factura {
    pub fn from_request(request: NewFactura) -> Self {
        let abonado = request.abonado.unwrap_or(Decimal::ZERO);
        let saldo_pendiente = request
            .saldo_pendiente
            .unwrap_or(request.total - abonado);
        let estado = request
            .estado
            .unwrap_or_else(|| EstadoFactura::for_balance(saldo_pendiente));

        Self {
            factura_id: request.factura_id.unwrap_or_else(Uuid::new_v4),
            client_id: request.client_id,
            cliente_nombre: request.cliente_nombre.trim().to_string(),
            nit: request.nit.trim().to_string(),
            descripcion: request.descripcion,
            fecha: request.fecha,
            fecha_vencimiento: request.fecha_vencimiento,
            total: request.total,
            iva: request.iva,
            total_sin_iva: request.total_sin_iva,
            abonado,
            saldo_pendiente,
            estado,
        }
    }

    pub fn is_voided(&self) -> bool {
        self.estado == EstadoFactura::Voided
    }

    /// Overwrite the supplied fields. A voided invoice keeps its status.
    pub fn apply_changes(&mut self, changes: &FacturaChanges) -> Result<()> {
        if let Some(estado) = changes.estado {
            if self.is_voided() && estado != EstadoFactura::Voided {
                return Err(AppError::conflict(format!(
                    "Factura {} is voided and cannot move to '{}'",
                    self.factura_id, estado
                )));
            }
            self.estado = estado;
        }

        if let Some(client_id) = changes.client_id {
            self.client_id = client_id;
        }
        if let Some(nombre) = &changes.cliente_nombre {
            self.cliente_nombre = nombre.trim().to_string();
        }
        if let Some(nit) = &changes.nit {
            self.nit = nit.trim().to_string();
        }
        if let Some(descripcion) = &changes.descripcion {
            self.descripcion = Some(descripcion.clone());
        }
        if let Some(fecha) = changes.fecha {
            self.fecha = fecha;
        }
        if let Some(vencimiento) = changes.fecha_vencimiento {
            self.fecha_vencimiento = vencimiento;
        }
        if let Some(total) = changes.total {
            self.total = total;
        }
        if let Some(iva) = changes.iva {
            self.iva = iva;
        }
        if let Some(total_sin_iva) = changes.total_sin_iva {
            self.total_sin_iva = total_sin_iva;
        }
        if let Some(abonado) = changes.abonado {
            self.abonado = abonado;
        }

        match changes.saldo_pendiente {
            Some(saldo) => self.saldo_pendiente = saldo,
            None if changes.total.is_some() || changes.abonado.is_some() => {
                self.saldo_pendiente = self.total - self.abonado;
                if changes.estado.is_none() && !self.is_voided() {
                    self.estado = EstadoFactura::for_balance(self.saldo_pendiente);
                }
            }
            None => {}
        }

        Ok(())
    }

    /// Case-insensitive containment over the searchable columns.
    pub fn matches_query(&self, needle_lowercase: &str) -> bool {
        self.cliente_nombre.to_lowercase().contains(needle_lowercase)
            || self.estado.as_str().contains(needle_lowercase)
            || self.nit.to_lowercase().contains(needle_lowercase)
            || self
                .fecha
                .format("%Y-%m-%d")
                .to_string()
                .contains(needle_lowercase)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pago {
    pub pago_id: Uuid,
    pub factura_id: Uuid,
    pub fecha: NaiveDate,
    pub monto: Decimal,
    pub monto_retenido: Decimal,
    pub boleta_pago: String,
}

impl Pago {
    pub fn from_request(request: NewPago) -> Self {
        Self {
            pago_id: request.pago_id.unwrap_or_else(Uuid::new_v4),
            factura_id: request.factura_id,
            fecha: request.fecha,
            monto: request.monto,
            monto_retenido: request.monto_retenido.unwrap_or(Decimal::ZERO),
            boleta_pago: request.boleta_pago.trim().to_string(),
        }
    }

    pub fn apply_changes(&mut self, changes: &PagoChanges) {
        if let Some(factura_id) = changes.factura_id {
            self.factura_id = factura_id;
        }
        if let Some(fecha) = changes.fecha {
            self.fecha = fecha;
        }
        if let Some(monto) = changes.monto {
            self.monto = monto;
        }
        if let Some(retenido) = changes.monto_retenido {
            self.monto_retenido = retenido;
        }
        if let Some(boleta) = &changes.boleta_pago {
            self.boleta_pago = boleta.trim().to_string();
        }
    }
}

// ============================================================================
// REQUESTS
// ============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewFactura {
    pub factura_id: Option<Uuid>,
    pub client_id: Uuid,
    #[validate(length(min = 1, max = 255, message = "cliente_nombre must be 1-255 characters"))]
    pub cliente_nombre: String,
    #[validate(length(min = 1, max = 64, message = "nit must be 1-64 characters"))]
    pub nit: String,
    #[validate(length(max = 2000, message = "descripcion must be at most 2000 characters"))]
    pub descripcion: Option<String>,
    pub fecha: NaiveDate,
    pub fecha_vencimiento: NaiveDate,
    pub total: Decimal,
    pub iva: Decimal,
    pub total_sin_iva: Decimal,
    pub abonado: Option<Decimal>,
    pub saldo_pendiente: Option<Decimal>,
    pub estado: Option<EstadoFactura>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct FacturaChanges {
    pub client_id: Option<Uuid>,
    #[validate(length(min = 1, max = 255, message = "cliente_nombre must be 1-255 characters"))]
    pub cliente_nombre: Option<String>,
    #[validate(length(min = 1, max = 64, message = "nit must be 1-64 characters"))]
    pub nit: Option<String>,
    #[validate(length(max = 2000, message = "descripcion must be at most 2000 characters"))]
    pub descripcion: Option<String>,
    pub fecha: Option<NaiveDate>,
    pub fecha_vencimiento: Option<NaiveDate>,
    pub total: Option<Decimal>,
    pub iva: Option<Decimal>,
    pub total_sin_iva: Option<Decimal>,
    pub abonado: Option<Decimal>,
    pub saldo_pendiente: Option<Decimal>,
    pub estado: Option<EstadoFactura>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewPago {
    pub pago_id: Option<Uuid>,
    pub factura_id: Uuid,
    pub fecha: NaiveDate,
    pub monto: Decimal,
    pub monto_retenido: Option<Decimal>,
    #[validate(length(min = 1, max = 100, message = "boleta_pago must be 1-100 characters"))]
    pub boleta_pago: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct PagoChanges {
    pub factura_id: Option<Uuid>,
    pub fecha: Option<NaiveDate>,
    pub monto: Option<Decimal>,
    pub monto_retenido: Option<Decimal>,
    #[validate(length(min = 1, max = 100, message = "boleta_pago must be 1-100 characters"))]
    pub boleta_pago: Option<String>,
}

// ============================================================================
// VALIDATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountRule {
    /// Balances may go negative on overpayment.
    Signed,
    NonNegative,
    Positive,
}

/// Record a field error when `value` is not a storable amount under `rule`.
pub fn check_amount(errors: &mut FieldErrors, field: &str, value: Decimal, rule: AmountRule) {
    let mut push = |message: String| {
        errors.entry(field.to_string()).or_default().push(message);
    };

    match rule {
        AmountRule::Positive if value <= Decimal::ZERO => {
            push(format!("{} must be greater than 0", field))
        }
        AmountRule::NonNegative if value < Decimal::ZERO => {
            push(format!("{} must not be negative", field))
        }
        _ => {}
    }

    if value.normalize().scale() > MONEY_SCALE {
        push(format!("{} must have at most {} decimal places", field, MONEY_SCALE));
    }
    if value.abs() >= money_limit() {
        push(format!("{} is too large", field));
    }
}

fn check_optional_amount(
    errors: &mut FieldErrors,
    field: &str,
    value: Option<Decimal>,
    rule: AmountRule,
) {
    if let Some(value) = value {
        check_amount(errors, field, value, rule);
    }
}

fn check_blank(errors: &mut FieldErrors, field: &str, value: Option<&str>) {
    if matches!(value, Some(v) if !v.is_empty() && v.trim().is_empty()) {
        errors
            .entry(field.to_string())
            .or_default()
            .push(format!("{} must not be blank", field));
    }
}

/// Declarative checks plus the money rules the derive cannot express.
pub trait ValidateRequest: Validate {
    fn extra_checks(&self, errors: &mut FieldErrors);

    fn field_errors(&self) -> FieldErrors {
        let mut errors = match self.validate() {
            Ok(()) => FieldErrors::new(),
            Err(e) => format_validation_errors(&e),
        };
        self.extra_checks(&mut errors);
        errors
    }

    fn check(&self) -> Result<()> {
        let errors = self.field_errors();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::invalid_fields(errors))
        }
    }
}

impl ValidateRequest for NewFactura {
    fn extra_checks(&self, errors: &mut FieldErrors) {
        check_blank(errors, "cliente_nombre", Some(&self.cliente_nombre));
        check_blank(errors, "nit", Some(&self.nit));
        check_amount(errors, "total", self.total, AmountRule::NonNegative);
        check_amount(errors, "iva", self.iva, AmountRule::NonNegative);
        check_amount(errors, "total_sin_iva", self.total_sin_iva, AmountRule::NonNegative);
        check_optional_amount(errors, "abonado", self.abonado, AmountRule::NonNegative);
        check_optional_amount(errors, "saldo_pendiente", self.saldo_pendiente, AmountRule::Signed);
    }
}

impl ValidateRequest for FacturaChanges {
    fn extra_checks(&self, errors: &mut FieldErrors) {
        check_blank(errors, "cliente_nombre", self.cliente_nombre.as_deref());
        check_blank(errors, "nit", self.nit.as_deref());
        check_optional_amount(errors, "total", self.total, AmountRule::NonNegative);
        check_optional_amount(errors, "iva", self.iva, AmountRule::NonNegative);
        check_optional_amount(errors, "total_sin_iva", self.total_sin_iva, AmountRule::NonNegative);
        check_optional_amount(errors, "abonado", self.abonado, AmountRule::NonNegative);
        check_optional_amount(errors, "saldo_pendiente", self.saldo_pendiente, AmountRule::Signed);
    }
}

impl ValidateRequest for NewPago {
    fn extra_checks(&self, errors: &mut FieldErrors) {
        check_blank(errors, "boleta_pago", Some(&self.boleta_pago));
        check_amount(errors, "monto", self.monto, AmountRule::Positive);
        check_optional_amount(errors, "monto_retenido", self.monto_retenido, AmountRule::NonNegative);
    }
}

impl ValidateRequest for PagoChanges {
    fn extra_checks(&self, errors: &mut FieldErrors) {
        check_blank(errors, "boleta_pago", self.boleta_pago.as_deref());
        check_optional_amount(errors, "monto", self.monto, AmountRule::Positive);
        check_optional_amount(errors, "monto_retenido", self.monto_retenido, AmountRule::NonNegative);
    }
}
