//! Router-level tests against the in-memory store.

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use facturacion_ws::{create_app_router, db::MemoryBillingStore, state::AppState};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use shared::config::{AppConfig, AuthConfig, DatabaseConfig, StorageBackend};
use jsonwebtoken::{encode, EncodingKey, Header};
use shared::{AuthService, Claims, Config, Roles};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

fn test_config() -> Config {
    Config {
        database: DatabaseConfig {
            url: "postgresql://localhost:5432/unused".to_string(),
            max_connections: 1,
            min_connections: 0,
            acquire_timeout_seconds: 1,
            idle_timeout_seconds: 1,
            max_lifetime_seconds: 1,
        },
        auth: AuthConfig {
            jwt_secret: "api-tests-secret".to_string(),
            access_token_ttl_seconds: 600,
        },
        app: AppConfig {
            environment: "test".to_string(),
            log_level: "warn".to_string(),
            port: 0,
            frontend_url: Some("http://localhost:3000".to_string()),
            storage: StorageBackend::Memory,
            max_request_size_kb: 1024,
        },
    }
}

struct TestApp {
    router: Router,
    admin_token: String,
    user_token: String,
}

impl TestApp {
    fn new() -> Self {
        let config = test_config();
        let auth = Arc::new(AuthService::new(&config.auth));
        let admin_token = auth
            .issue_token("admin-1", Some("admin@example.com"), vec![Roles::ADMIN.to_string()])
            .unwrap();
        let user_token = auth
            .issue_token("user-1", None, vec![Roles::USER.to_string()])
            .unwrap();

        let state = AppState::with_store(Arc::new(MemoryBillingStore::new()), auth);
        let router = create_app_router(Arc::new(state), &config);

        Self {
            router,
            admin_token,
            user_token,
        }
    }

    async fn request_as(
        &self,
        token: Option<&str>,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn admin(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.request_as(Some(self.admin_token.as_str()), method, uri, body)
            .await
    }

    async fn create_factura(&self, nombre: &str, total: i64) -> Value {
        let (status, body) = self
            .admin(
                Method::POST,
                "/facturas",
                Some(json!({
                    "client_id": Uuid::new_v4(),
                    "cliente_nombre": nombre,
                    "nit": "4455667-1",
                    "fecha": "2024-07-01",
                    "fecha_vencimiento": "2024-07-31",
                    "total": total,
                    "iva": 0,
                    "total_sin_iva": total
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body
    }

    async fn pay(&self, factura_id: &str, monto: &str) -> (StatusCode, Value) {
        self.admin(
            Method::POST,
            "/pagos",
            Some(json!({
                "factura_id": factura_id,
                "fecha": "2024-07-05",
                "monto": monto,
                "boleta_pago": "DEP-7781"
            })),
        )
        .await
    }
}

fn money(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().unwrap(),
        other => other.to_string().parse().unwrap(),
    }
}

fn id_of(value: &Value, field: &str) -> String {
    value[field].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_needs_no_token() {
    let app = TestApp::new();
    let (status, body) = app.request_as(None, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_missing_token_is_401() {
    let app = TestApp::new();
    let (status, body) = app.request_as(None, Method::GET, "/facturas", None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "AUTH_ERROR");
}

fn sign(claims: &Claims, secret: &str) -> String {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

fn legacy_claims(exp_offset: i64) -> Claims {
    let now = chrono::Utc::now().timestamp();
    Claims {
        sub: "legacy-admin".to_string(),
        email: None,
        roles: Vec::new(),
        role: Some(Roles::ADMIN.to_string()),
        exp: now + exp_offset,
        iat: now,
        jti: None,
    }
}

#[tokio::test]
async fn test_single_role_token_is_accepted() {
    let app = TestApp::new();
    let token = sign(&legacy_claims(600), "api-tests-secret");
    let (status, _) = app
        .request_as(Some(token.as_str()), Method::GET, "/pagos", None)
        .await;

    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_expired_or_foreign_token_is_401() {
    let app = TestApp::new();

    let expired = sign(&legacy_claims(-3600), "api-tests-secret");
    let (status, _) = app
        .request_as(Some(expired.as_str()), Method::GET, "/facturas", None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let foreign = sign(&legacy_claims(600), "some-other-secret");
    let (status, _) = app
        .request_as(Some(foreign.as_str()), Method::GET, "/facturas", None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_non_admin_is_403() {
    let app = TestApp::new();
    let (status, body) = app
        .request_as(Some(app.user_token.as_str()), Method::GET, "/pagos", None)
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "AUTHZ_ERROR");
}

#[tokio::test]
async fn test_invalid_body_lists_offending_fields() {
    let app = TestApp::new();
    let (status, body) = app
        .admin(
            Method::POST,
            "/facturas",
            Some(json!({
                "client_id": Uuid::new_v4(),
                "cliente_nombre": "",
                "nit": "CF",
                "fecha": "2024-07-01",
                "fecha_vencimiento": "2024-07-31",
                "total": -5,
                "iva": 0,
                "total_sin_iva": "0.001"
            })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");
    let details = body["details"].as_object().unwrap();
    assert!(details.contains_key("cliente_nombre"));
    assert!(details.contains_key("total"));
    assert!(details.contains_key("total_sin_iva"));
    assert!(!details.contains_key("nit"));
}

#[tokio::test]
async fn test_missing_field_is_named() {
    let app = TestApp::new();
    let (status, body) = app
        .admin(
            Method::POST,
            "/pagos",
            Some(json!({
                "factura_id": Uuid::new_v4(),
                "fecha": "2024-07-05",
                "monto": 10
            })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["details"]
        .as_object()
        .unwrap()
        .contains_key("boleta_pago"));
}

#[tokio::test]
async fn test_malformed_path_id_is_400() {
    let app = TestApp::new();
    let (status, body) = app.admin(Method::GET, "/facturas/123", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["details"]
        .as_object()
        .unwrap()
        .contains_key("factura_id"));
}

#[tokio::test]
async fn test_create_then_pay_in_full() {
    let app = TestApp::new();
    let (status, created) = app
        .admin(
            Method::POST,
            "/facturas",
            Some(json!({
                "client_id": Uuid::new_v4(),
                "cliente_nombre": "Distribuidora Central",
                "nit": "1234567-8",
                "descripcion": "Servicios de julio",
                "fecha": "2024-07-01",
                "fecha_vencimiento": "2024-07-31",
                "total": 1000,
                "iva": 160,
                "total_sin_iva": 840
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let factura_id = id_of(&created, "factura_id");

    let (status, stored) = app
        .admin(Method::GET, &format!("/facturas/{}", factura_id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(money(&stored["total"]), Decimal::from(1000));
    assert_eq!(money(&stored["iva"]), Decimal::from(160));
    assert_eq!(money(&stored["total_sin_iva"]), Decimal::from(840));
    assert_eq!(money(&stored["saldo_pendiente"]), Decimal::from(1000));
    assert_eq!(stored["estado"], "pending");

    let (status, pago) = app.pay(&factura_id, "1000").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(pago["factura_id"], factura_id.as_str());

    let (_, paid) = app
        .admin(Method::GET, &format!("/facturas/{}", factura_id), None)
        .await;
    assert_eq!(money(&paid["abonado"]), Decimal::from(1000));
    assert_eq!(money(&paid["saldo_pendiente"]), Decimal::ZERO);
    assert_eq!(paid["estado"], "paid");
}

#[tokio::test]
async fn test_payment_for_unknown_invoice_is_404() {
    let app = TestApp::new();
    let (status, body) = app.pay(&Uuid::new_v4().to_string(), "10").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NOT_FOUND");
}

#[tokio::test]
async fn test_single_invoice_listing() {
    let app = TestApp::new();
    app.create_factura("Acme", 100).await;

    let (status, page) = app.admin(Method::GET, "/facturas", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
    assert_eq!(page["totalPages"], 1);
    assert_eq!(page["currentPage"], 1);
    assert_eq!(page["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_listing_ignores_malformed_paging() {
    let app = TestApp::new();
    for i in 0..3 {
        app.create_factura(&format!("Cliente {}", i), 10).await;
    }

    let (status, page) = app
        .admin(Method::GET, "/facturas?page=abc&pageSize=2", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["currentPage"], 1);
    assert_eq!(page["totalPages"], 2);
    assert_eq!(page["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_search_is_case_insensitive() {
    let app = TestApp::new();
    app.create_factura("Ferretería El Martillo", 100).await;
    app.create_factura("Panadería Lupita", 100).await;

    let (_, hit) = app
        .admin(Method::GET, "/facturas?query=MARTILLO", None)
        .await;
    assert_eq!(hit["total"], 1);
    assert_eq!(hit["data"][0]["cliente_nombre"], "Ferretería El Martillo");

    let (_, miss) = app.admin(Method::GET, "/facturas?query=zapateria", None).await;
    assert_eq!(miss["total"], 0);
    assert!(miss["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_void_and_missing_void() {
    let app = TestApp::new();
    let created = app.create_factura("Acme", 100).await;
    let factura_id = id_of(&created, "factura_id");

    let (status, voided) = app
        .admin(Method::PATCH, &format!("/facturas/{}/anular", factura_id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(voided["estado"], "voided");

    let (status, _) = app.pay(&factura_id, "10").await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .admin(
            Method::PATCH,
            &format!("/facturas/{}/anular", Uuid::new_v4()),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_cannot_revive_voided_invoice() {
    let app = TestApp::new();
    let created = app.create_factura("Acme", 100).await;
    let factura_id = id_of(&created, "factura_id");
    app.admin(Method::PATCH, &format!("/facturas/{}/anular", factura_id), None)
        .await;

    let (status, _) = app
        .admin(
            Method::PUT,
            &format!("/facturas/{}", factura_id),
            Some(json!({ "estado": "pending" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, renamed) = app
        .admin(
            Method::PUT,
            &format!("/facturas/{}", factura_id),
            Some(json!({ "cliente_nombre": "Acme Holdings" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(renamed["cliente_nombre"], "Acme Holdings");
    assert_eq!(renamed["estado"], "voided");
}

#[tokio::test]
async fn test_delete_invoice_removes_its_payments() {
    let app = TestApp::new();
    let created = app.create_factura("Acme", 100).await;
    let factura_id = id_of(&created, "factura_id");
    let (_, pago) = app.pay(&factura_id, "25.50").await;
    let pago_id = id_of(&pago, "pago_id");

    let (status, body) = app
        .admin(Method::DELETE, &format!("/facturas/{}", factura_id), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let (status, _) = app
        .admin(Method::GET, &format!("/pagos/{}", pago_id), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, pagos) = app
        .admin(Method::GET, &format!("/pagos/factura/{}", factura_id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(pagos.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_editing_payment_rebalances_invoice() {
    let app = TestApp::new();
    let created = app.create_factura("Acme", 100).await;
    let factura_id = id_of(&created, "factura_id");
    let (_, pago) = app.pay(&factura_id, "100").await;
    let pago_id = id_of(&pago, "pago_id");

    let (status, updated) = app
        .admin(
            Method::PUT,
            &format!("/pagos/{}", pago_id),
            Some(json!({ "monto": "30.00" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(money(&updated["monto"]), Decimal::from(30));

    let (_, factura) = app
        .admin(Method::GET, &format!("/facturas/{}", factura_id), None)
        .await;
    assert_eq!(money(&factura["saldo_pendiente"]), Decimal::from(70));
    assert_eq!(factura["estado"], "pending");

    let (status, _) = app
        .admin(Method::DELETE, &format!("/pagos/{}", pago_id), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, factura) = app
        .admin(Method::GET, &format!("/facturas/{}", factura_id), None)
        .await;
    assert_eq!(money(&factura["abonado"]), Decimal::ZERO);
    assert_eq!(money(&factura["saldo_pendiente"]), Decimal::from(100));
}

#[tokio::test]
async fn test_lookup_by_client_nit_and_latest() {
    let app = TestApp::new();
    let created = app.create_factura("Acme", 100).await;
    app.create_factura("Globex", 200).await;
    let client_id = id_of(&created, "client_id");

    let (_, by_client) = app
        .admin(Method::GET, &format!("/facturas/cliente/{}", client_id), None)
        .await;
    assert_eq!(by_client.as_array().unwrap().len(), 1);

    let (_, by_nit) = app.admin(Method::GET, "/facturas/nit/4455667-1", None).await;
    assert_eq!(by_nit.as_array().unwrap().len(), 2);

    let (_, latest) = app.admin(Method::GET, "/facturas/latest?limit=1", None).await;
    assert_eq!(latest.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_responses_carry_security_headers() {
    let app = TestApp::new();
    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert_eq!(response.headers()["x-frame-options"], "DENY");
}
