//! Integration tests for registration, login, the password policy and
//! account lockout.

mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use serde_json::json;

use common::{spawn_app, LOCKOUT_THRESHOLD};

#[tokio::test]
async fn register_and_login_round_trip() {
    let app = spawn_app().await;
    app.register("alice@example.com", "landlord").await;

    let (status, body) = app
        .post(
            "/api/auth/login",
            None,
            json!({ "email": "alice@example.com", "password": "Str0ng!pass" }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "alice@example.com");
    assert_eq!(body["user"]["role"], "landlord");
    assert!(body["token"].as_str().unwrap().len() > 20);
}

#[tokio::test]
async fn duplicate_email_conflicts() {
    let app = spawn_app().await;
    app.register("bob@example.com", "tenant").await;

    let (status, body) = app
        .post(
            "/api/auth/register",
            None,
            json!({
                "email": "bob@example.com",
                "name": "Bob Again",
                "password": "Str0ng!pass",
                "role": "tenant",
            }),
        )
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("already registered"));
}

#[tokio::test]
async fn password_policy_names_missing_class() {
    let app = spawn_app().await;

    let cases = [
        ("Sh0rt!", "at least 8"),
        ("alllower1!", "uppercase"),
        ("ALLUPPER1!", "lowercase"),
        ("NoDigitsHere!", "digit"),
        ("NoSpecial123", "special"),
    ];

    for (password, expected) in cases {
        let (status, body) = app
            .post(
                "/api/auth/register",
                None,
                json!({
                    "email": "weak@example.com",
                    "name": "Weak",
                    "password": password,
                    "role": "tenant",
                }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "password: {password}");
        assert!(
            body["error"].as_str().unwrap().contains(expected),
            "password {password:?} produced {body}"
        );
    }
}

#[tokio::test]
async fn cannot_self_register_as_admin() {
    let app = spawn_app().await;

    let (status, _) = app
        .post(
            "/api/auth/register",
            None,
            json!({
                "email": "root@example.com",
                "name": "Root",
                "password": "Str0ng!pass",
                "role": "admin",
            }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn protected_route_requires_token() {
    let app = spawn_app().await;

    let (status, _) = app.get("/api/auth/me", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.get("/api/properties", Some("not-a-jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn lockout_blocks_correct_password_until_expiry() {
    let app = spawn_app().await;
    let (user_id, _) = app.register("locked@example.com", "tenant").await;

    for _ in 0..LOCKOUT_THRESHOLD {
        let (status, _) = app
            .post(
                "/api/auth/login",
                None,
                json!({ "email": "locked@example.com", "password": "Wrong!pass1" }),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    // The correct password is refused while the lock is in force.
    let (status, body) = app
        .post(
            "/api/auth/login",
            None,
            json!({ "email": "locked@example.com", "password": "Str0ng!pass" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].as_str().unwrap().contains("locked"));

    // Expire the lock and the same credentials work again, resetting the
    // failure counter.
    sqlx::query("UPDATE users SET locked_until = ? WHERE id = ?")
        .bind((Utc::now() - Duration::minutes(1)).to_rfc3339())
        .bind(&user_id)
        .execute(&app.db.pool)
        .await
        .unwrap();

    let (status, _) = app
        .post(
            "/api/auth/login",
            None,
            json!({ "email": "locked@example.com", "password": "Str0ng!pass" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let attempts = sqlx::query_scalar::<_, i64>(
        "SELECT failed_login_attempts FROM users WHERE id = ?",
    )
    .bind(&user_id)
    .fetch_one(&app.db.pool)
    .await
    .unwrap();
    assert_eq!(attempts, 0);
}

#[tokio::test]
async fn change_password_requires_current_password() {
    let app = spawn_app().await;
    let (_, token) = app.register("carol@example.com", "tenant").await;

    let (status, _) = app
        .post(
            "/api/auth/change-password",
            Some(&token),
            json!({ "current_password": "Wrong!pass1", "new_password": "N3w!passwd" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .post(
            "/api/auth/change-password",
            Some(&token),
            json!({ "current_password": "Str0ng!pass", "new_password": "N3w!passwd" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .post(
            "/api/auth/login",
            None,
            json!({ "email": "carol@example.com", "password": "N3w!passwd" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}
