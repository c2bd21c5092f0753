use axum::{extract::State, http::StatusCode, middleware as axum_middleware, routing::get, Json, Router};
use serde_json::json;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod util;

#[derive(Clone)]
pub struct AppState {
    pub db: db::Database,
    pub config: config::Config,
}

/// Assembles the full application router. Auth login/register and the
/// Stripe webhook stay outside the auth middleware; everything else under
/// /api requires a bearer token.
pub fn build_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .nest("/auth", routes::auth::protected_router())
        .nest("/properties", routes::properties::router())
        .nest("/units", routes::units::router())
        .nest("/leases", routes::leases::router())
        .nest("/maintenance", routes::maintenance::router())
        .nest("/messages", routes::messages::router())
        .nest("/notifications", routes::notifications::router())
        .nest("/invoices", routes::invoices::router())
        .nest("/payments", routes::payments::router())
        .nest("/analytics", routes::analytics::router())
        .nest("/admin", routes::admin::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    let api_router = Router::new()
        .nest("/auth", routes::auth::router())
        .nest("/stripe", routes::stripe::router())
        .merge(protected_routes);

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .nest("/api", api_router)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

async fn health_check() -> &'static str {
    "OK"
}

async fn readiness_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&state.db.pool)
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;

    Ok(Json(json!({ "status": "ready" })))
}
