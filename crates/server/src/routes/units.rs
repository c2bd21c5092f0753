use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    db::models::Unit,
    error::{AppError, Result},
    middleware::auth::AuthUser,
    routes::properties::{fetch_accessible_property, fetch_owned_property},
    AppState,
};

const UNIT_STATUSES: [&str; 3] = ["available", "occupied", "maintenance"];

pub fn router() -> Router<AppState> {
    Router::new().route("/:id", get(get_unit).put(update_unit).delete(delete_unit))
}

#[derive(Debug, Deserialize)]
pub struct CreateUnitRequest {
    pub unit_number: String,
    pub rent_amount_cents: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUnitRequest {
    pub unit_number: Option<String>,
    pub rent_amount_cents: Option<i64>,
    pub status: Option<String>,
}

async fn fetch_unit(state: &AppState, unit_id: &str) -> Result<Unit> {
    sqlx::query_as::<_, Unit>("SELECT * FROM units WHERE id = ?")
        .bind(unit_id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Unit not found".to_string()))
}

// Mounted under /properties/:id/units by the properties router.
pub async fn list_units(
    State(state): State<AppState>,
    user: AuthUser,
    Path(property_id): Path<String>,
) -> Result<Json<Vec<Unit>>> {
    fetch_accessible_property(&state, &user, &property_id).await?;

    let units = sqlx::query_as::<_, Unit>(
        "SELECT * FROM units WHERE property_id = ? ORDER BY unit_number ASC",
    )
    .bind(&property_id)
    .fetch_all(&state.db.pool)
    .await?;

    Ok(Json(units))
}

pub async fn create_unit(
    State(state): State<AppState>,
    user: AuthUser,
    Path(property_id): Path<String>,
    Json(body): Json<CreateUnitRequest>,
) -> Result<Json<Unit>> {
    user.require_landlord()?;
    fetch_owned_property(&state, &user, &property_id).await?;

    if body.unit_number.trim().is_empty() {
        return Err(AppError::Validation("Unit number is required".to_string()));
    }
    if body.rent_amount_cents <= 0 {
        return Err(AppError::Validation(
            "Rent amount must be positive".to_string(),
        ));
    }

    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    let inserted = sqlx::query(
        "INSERT INTO units (id, property_id, unit_number, status, rent_amount_cents, created_at, updated_at)
         VALUES (?, ?, ?, 'available', ?, ?, ?)",
    )
    .bind(&id)
    .bind(&property_id)
    .bind(&body.unit_number)
    .bind(body.rent_amount_cents)
    .bind(&now)
    .bind(&now)
    .execute(&state.db.pool)
    .await
    .map_err(AppError::from);

    if let Err(err) = inserted {
        if err.is_unique_violation() {
            return Err(AppError::Conflict(
                "Unit number already exists for this property".to_string(),
            ));
        }
        return Err(err);
    }

    let unit = fetch_unit(&state, &id).await?;
    Ok(Json(unit))
}

async fn get_unit(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Unit>> {
    let unit = fetch_unit(&state, &id).await?;
    fetch_accessible_property(&state, &user, &unit.property_id).await?;
    Ok(Json(unit))
}

async fn update_unit(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateUnitRequest>,
) -> Result<Json<Unit>> {
    user.require_landlord()?;
    let unit = fetch_unit(&state, &id).await?;
    fetch_owned_property(&state, &user, &unit.property_id).await?;

    if let Some(status) = &body.status {
        if !UNIT_STATUSES.contains(&status.as_str()) {
            return Err(AppError::Validation(
                "Status must be 'available', 'occupied' or 'maintenance'".to_string(),
            ));
        }
    }
    if let Some(rent) = body.rent_amount_cents {
        if rent <= 0 {
            return Err(AppError::Validation(
                "Rent amount must be positive".to_string(),
            ));
        }
    }

    let now = Utc::now().to_rfc3339();
    sqlx::query(
        "UPDATE units SET unit_number = ?, rent_amount_cents = ?, status = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(body.unit_number.as_deref().unwrap_or(&unit.unit_number))
    .bind(body.rent_amount_cents.unwrap_or(unit.rent_amount_cents))
    .bind(body.status.as_deref().unwrap_or(&unit.status))
    .bind(&now)
    .bind(&id)
    .execute(&state.db.pool)
    .await?;

    let unit = fetch_unit(&state, &id).await?;
    Ok(Json(unit))
}

async fn delete_unit(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    user.require_landlord()?;
    let unit = fetch_unit(&state, &id).await?;
    fetch_owned_property(&state, &user, &unit.property_id).await?;

    let active_leases = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM leases WHERE unit_id = ? AND status = 'active'",
    )
    .bind(&id)
    .fetch_one(&state.db.pool)
    .await?;

    if active_leases > 0 {
        return Err(AppError::Conflict(
            "Unit has an active lease and cannot be deleted".to_string(),
        ));
    }

    sqlx::query("DELETE FROM units WHERE id = ?")
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    Ok(Json(serde_json::json!({ "status": "deleted" })))
}
