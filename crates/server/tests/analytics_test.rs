//! Integration tests for the analytics endpoints.

mod common;

use axum::http::StatusCode;
use serde_json::json;
use uuid::Uuid;

use common::{spawn_app, TestApp};

/// Inserts a paid payment directly, with a chosen completion timestamp.
async fn insert_paid_payment(
    app: &TestApp,
    tenant_id: &str,
    landlord_id: &str,
    amount_cents: i64,
    completed_at: &str,
) {
    sqlx::query(
        "INSERT INTO payments (id, payment_intent_id, tenant_id, landlord_id, amount_cents,
                               currency, status, created_at, completed_at)
         VALUES (?, ?, ?, ?, ?, 'usd', 'paid', ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(format!("pi_{}", Uuid::new_v4()))
    .bind(tenant_id)
    .bind(landlord_id)
    .bind(amount_cents)
    .bind(completed_at)
    .bind(completed_at)
    .execute(&app.db.pool)
    .await
    .unwrap();
}

#[tokio::test]
async fn revenue_buckets_by_month_with_zero_fill() {
    let app = spawn_app().await;
    let (landlord_id, landlord) = app.register("owner@example.com", "landlord").await;
    let (tenant_id, _) = app.register("tenant@example.com", "tenant").await;

    // Two payments in January, one in March; February stays empty.
    insert_paid_payment(&app, &tenant_id, &landlord_id, 100_000, "2025-01-05T10:00:00+00:00").await;
    insert_paid_payment(&app, &tenant_id, &landlord_id, 50_000, "2025-01-28T10:00:00+00:00").await;
    insert_paid_payment(&app, &tenant_id, &landlord_id, 75_000, "2025-03-02T10:00:00+00:00").await;
    // Outside the range, must not be counted.
    insert_paid_payment(&app, &tenant_id, &landlord_id, 999_999, "2024-12-31T23:00:00+00:00").await;

    let (status, body) = app
        .get(
            "/api/analytics/revenue?from=2025-01-01&to=2025-03-31",
            Some(&landlord),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let buckets = body.as_array().unwrap();
    assert_eq!(buckets.len(), 3);
    assert_eq!(buckets[0]["month"], "2025-01");
    assert_eq!(buckets[0]["amount_cents"], 150_000);
    assert_eq!(buckets[1]["month"], "2025-02");
    assert_eq!(buckets[1]["amount_cents"], 0);
    assert_eq!(buckets[2]["month"], "2025-03");
    assert_eq!(buckets[2]["amount_cents"], 75_000);
}

#[tokio::test]
async fn revenue_is_scoped_to_the_calling_landlord() {
    let app = spawn_app().await;
    let (first_id, _) = app.register("first@example.com", "landlord").await;
    let (second_id, second) = app.register("second@example.com", "landlord").await;
    let (tenant_id, _) = app.register("tenant@example.com", "tenant").await;

    insert_paid_payment(&app, &tenant_id, &first_id, 80_000, "2025-05-10T08:00:00+00:00").await;
    insert_paid_payment(&app, &tenant_id, &second_id, 30_000, "2025-05-12T08:00:00+00:00").await;

    let (_, body) = app
        .get(
            "/api/analytics/revenue?from=2025-05-01&to=2025-05-31",
            Some(&second),
        )
        .await;
    let buckets = body.as_array().unwrap();
    assert_eq!(buckets[0]["amount_cents"], 30_000);
}

#[tokio::test]
async fn summary_reports_occupancy_and_balances() {
    let app = spawn_app().await;
    let (landlord_id, landlord) = app.register("owner@example.com", "landlord").await;
    let (tenant_id, _) = app.register("tenant@example.com", "tenant").await;
    let property_id = app.create_property(&landlord, "Summary Square").await;

    for (number, status) in [("1A", "occupied"), ("1B", "available")] {
        let (_, unit) = app
            .post(
                &format!("/api/properties/{property_id}/units"),
                Some(&landlord),
                json!({ "unit_number": number, "rent_amount_cents": 90_000 }),
            )
            .await;
        if status != "available" {
            app.put(
                &format!("/api/units/{}", unit["id"].as_str().unwrap()),
                Some(&landlord),
                json!({ "status": status }),
            )
            .await;
        }
    }

    insert_paid_payment(&app, &tenant_id, &landlord_id, 90_000, "2025-04-01T00:00:00+00:00").await;

    let (status, body) = app.get("/api/analytics/summary", Some(&landlord)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["properties"], 1);
    assert_eq!(body["units"], 2);
    assert_eq!(body["occupied_units"], 1);
    assert!((body["occupancy_rate"].as_f64().unwrap() - 0.5).abs() < f64::EPSILON);
    assert_eq!(body["collected_cents"], 90_000);
}

#[tokio::test]
async fn tenants_have_no_analytics_surface() {
    let app = spawn_app().await;
    let (_, tenant) = app.register("tenant@example.com", "tenant").await;

    for uri in [
        "/api/analytics/summary",
        "/api/analytics/revenue",
        "/api/analytics/maintenance",
    ] {
        let (status, _) = app.get(uri, Some(&tenant)).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{uri}");
    }
}
