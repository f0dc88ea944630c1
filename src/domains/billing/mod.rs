pub mod models;
pub mod pagination;
pub mod payment;
pub mod service;

pub use models::{
    EstadoFactura, Factura, FacturaChanges, NewFactura, NewPago, Pago, PagoChanges,
    ValidateRequest,
};
pub use pagination::{FacturaFilter, LatestQuery, ListFacturasQuery, Page};
pub use service::{BillingService, PagoRegistrado};
