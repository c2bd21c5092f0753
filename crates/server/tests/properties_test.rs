//! Integration tests for property and unit CRUD and ownership checks.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::spawn_app;

#[tokio::test]
async fn property_round_trip() {
    let app = spawn_app().await;
    let (_, landlord) = app.register("owner@example.com", "landlord").await;

    let property_id = app.create_property(&landlord, "Maple Court").await;

    let (status, body) = app
        .get(&format!("/api/properties/{property_id}"), Some(&landlord))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Maple Court");
    assert_eq!(body["city"], "Springfield");
    assert_eq!(body["status"], "active");

    let (status, body) = app
        .put(
            &format!("/api/properties/{property_id}"),
            Some(&landlord),
            json!({ "name": "Maple Court II" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Maple Court II");

    // The update is visible on a subsequent GET.
    let (_, body) = app
        .get(&format!("/api/properties/{property_id}"), Some(&landlord))
        .await;
    assert_eq!(body["name"], "Maple Court II");
}

#[tokio::test]
async fn tenant_cannot_mutate_properties() {
    let app = spawn_app().await;
    let (_, landlord) = app.register("owner@example.com", "landlord").await;
    let (_, tenant) = app.register("tenant@example.com", "tenant").await;

    let property_id = app.create_property(&landlord, "Oak Row").await;

    let (status, _) = app
        .post(
            "/api/properties",
            Some(&tenant),
            json!({
                "name": "Rogue",
                "address_line1": "2 Side St",
                "city": "Springfield",
                "state": "IL",
                "postal_code": "62701",
                "property_type": "house",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .put(
            &format!("/api/properties/{property_id}"),
            Some(&tenant),
            json!({ "name": "Hijacked" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn landlords_cannot_see_each_others_properties() {
    let app = spawn_app().await;
    let (_, first) = app.register("first@example.com", "landlord").await;
    let (_, second) = app.register("second@example.com", "landlord").await;

    let property_id = app.create_property(&first, "Hidden Gardens").await;

    let (status, _) = app
        .get(&format!("/api/properties/{property_id}"), Some(&second))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = app.get("/api/properties", Some(&second)).await;
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn property_list_is_paginated() {
    let app = spawn_app().await;
    let (_, landlord) = app.register("owner@example.com", "landlord").await;

    for n in 0..5 {
        app.create_property(&landlord, &format!("Block {n}")).await;
    }

    let (status, body) = app
        .get("/api/properties?page=2&per_page=2", Some(&landlord))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 5);
    assert_eq!(body["page"], 2);
    assert_eq!(body["items"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn unit_numbers_are_unique_per_property() {
    let app = spawn_app().await;
    let (_, landlord) = app.register("owner@example.com", "landlord").await;
    let property_id = app.create_property(&landlord, "Birch Flats").await;

    let unit = json!({ "unit_number": "1A", "rent_amount_cents": 95_000 });
    let (status, _) = app
        .post(
            &format!("/api/properties/{property_id}/units"),
            Some(&landlord),
            unit.clone(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .post(
            &format!("/api/properties/{property_id}/units"),
            Some(&landlord),
            unit,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
}

#[tokio::test]
async fn tenant_with_active_lease_can_read_property() {
    let app = spawn_app().await;
    let (_, landlord) = app.register("owner@example.com", "landlord").await;
    let (tenant_id, tenant) = app.register("tenant@example.com", "tenant").await;
    let property_id = app.create_property(&landlord, "Cedar Heights").await;

    // No lease yet: the property is invisible.
    let (status, _) = app
        .get(&format!("/api/properties/{property_id}"), Some(&tenant))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    app.activate_lease(&landlord, &tenant_id, &property_id).await;

    let (status, body) = app
        .get(&format!("/api/properties/{property_id}"), Some(&tenant))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Cedar Heights");
}
