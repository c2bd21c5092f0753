//! Shared helpers for integration tests: an app wired to an in-memory
//! database plus JSON request plumbing.

// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use renthub_server::{build_router, config::Config, db::Database, AppState};

pub const JWT_SECRET: &str = "test-secret";
pub const WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const LOCKOUT_THRESHOLD: i64 = 3;

pub struct TestApp {
    pub app: Router,
    pub db: Database,
}

pub async fn spawn_app() -> TestApp {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("in-memory database");
    db.run_migrations().await.expect("migrations");

    let config = Config {
        port: 0,
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: JWT_SECRET.to_string(),
        token_ttl_hours: 24,
        stripe_webhook_secret: WEBHOOK_SECRET.to_string(),
        lockout_threshold: LOCKOUT_THRESHOLD,
        lockout_minutes: 15,
        admin_email: None,
        admin_password: None,
    };

    let app = build_router(AppState {
        db: db.clone(),
        config,
    });

    TestApp { app, db }
}

impl TestApp {
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request("GET", uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request("POST", uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request("PUT", uri, token, Some(body)).await
    }

    /// Provisions an admin the way startup does and returns a logged-in
    /// token.
    pub async fn create_admin(&self, email: &str, password: &str) -> String {
        renthub_server::services::bootstrap::bootstrap_admin(&self.db.pool, email, password)
            .await
            .expect("admin bootstrap");

        let (status, body) = self
            .post(
                "/api/auth/login",
                None,
                json!({ "email": email, "password": password }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "admin login failed: {body}");
        body["token"].as_str().unwrap().to_string()
    }

    /// Registers a user and returns (user_id, token).
    pub async fn register(&self, email: &str, role: &str) -> (String, String) {
        let (status, body) = self
            .post(
                "/api/auth/register",
                None,
                json!({
                    "email": email,
                    "name": "Test User",
                    "password": "Str0ng!pass",
                    "role": role,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "registration failed: {body}");
        (
            body["user"]["id"].as_str().unwrap().to_string(),
            body["token"].as_str().unwrap().to_string(),
        )
    }

    /// Creates a property owned by the given landlord token.
    pub async fn create_property(&self, token: &str, name: &str) -> String {
        let (status, body) = self
            .post(
                "/api/properties",
                Some(token),
                json!({
                    "name": name,
                    "address_line1": "1 Main St",
                    "city": "Springfield",
                    "state": "IL",
                    "postal_code": "62701",
                    "property_type": "apartment",
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "property creation failed: {body}");
        body["id"].as_str().unwrap().to_string()
    }

    /// Creates and activates a lease so the tenant is attached to the
    /// property.
    pub async fn activate_lease(
        &self,
        landlord_token: &str,
        tenant_id: &str,
        property_id: &str,
    ) -> String {
        let (status, body) = self
            .post(
                "/api/leases",
                Some(landlord_token),
                json!({
                    "tenant_id": tenant_id,
                    "property_id": property_id,
                    "rent_amount_cents": 120_000,
                    "start_date": "2025-01-01",
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "lease creation failed: {body}");
        let lease_id = body["id"].as_str().unwrap().to_string();

        let (status, body) = self
            .post(
                &format!("/api/leases/{lease_id}/activate"),
                Some(landlord_token),
                json!({}),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "lease activation failed: {body}");
        lease_id
    }
}
