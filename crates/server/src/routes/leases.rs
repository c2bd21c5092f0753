use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    db::models::{Lease, Role},
    error::{AppError, Result},
    middleware::auth::AuthUser,
    routes::properties::fetch_owned_property,
    services::notify,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_leases).post(create_lease))
        .route("/:id", get(get_lease).delete(delete_lease))
        .route("/:id/activate", post(activate_lease))
        .route("/:id/end", post(end_lease))
}

#[derive(Debug, Deserialize)]
pub struct CreateLeaseRequest {
    pub tenant_id: String,
    pub property_id: String,
    pub unit_id: Option<String>,
    pub rent_amount_cents: i64,
    pub start_date: String,
    pub end_date: Option<String>,
}

async fn fetch_lease(state: &AppState, lease_id: &str) -> Result<Lease> {
    sqlx::query_as::<_, Lease>("SELECT * FROM leases WHERE id = ?")
        .bind(lease_id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Lease not found".to_string()))
}

/// Loads a lease the calling landlord manages (via the property) or that
/// admins can always touch.
async fn fetch_managed_lease(state: &AppState, user: &AuthUser, lease_id: &str) -> Result<Lease> {
    let lease = fetch_lease(state, lease_id).await?;
    fetch_owned_property(state, user, &lease.property_id).await?;
    Ok(lease)
}

async fn has_active_lease(state: &AppState, tenant_id: &str, property_id: &str) -> Result<bool> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM leases WHERE tenant_id = ? AND property_id = ? AND status = 'active'",
    )
    .bind(tenant_id)
    .bind(property_id)
    .fetch_one(&state.db.pool)
    .await?;
    Ok(count > 0)
}

async fn list_leases(State(state): State<AppState>, user: AuthUser) -> Result<Json<Vec<Lease>>> {
    let leases = match user.role {
        Role::Admin => {
            sqlx::query_as::<_, Lease>("SELECT * FROM leases ORDER BY created_at DESC")
                .fetch_all(&state.db.pool)
                .await?
        }
        Role::Landlord => {
            sqlx::query_as::<_, Lease>(
                "SELECT l.* FROM leases l
                 JOIN properties p ON l.property_id = p.id
                 WHERE p.landlord_id = ?
                 ORDER BY l.created_at DESC",
            )
            .bind(&user.id)
            .fetch_all(&state.db.pool)
            .await?
        }
        Role::Tenant => {
            sqlx::query_as::<_, Lease>(
                "SELECT * FROM leases WHERE tenant_id = ? ORDER BY created_at DESC",
            )
            .bind(&user.id)
            .fetch_all(&state.db.pool)
            .await?
        }
    };

    Ok(Json(leases))
}

async fn create_lease(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CreateLeaseRequest>,
) -> Result<Json<Lease>> {
    user.require_landlord()?;
    fetch_owned_property(&state, &user, &body.property_id).await?;

    if body.rent_amount_cents <= 0 {
        return Err(AppError::Validation(
            "Rent amount must be positive".to_string(),
        ));
    }

    let tenant_role = sqlx::query_scalar::<_, String>("SELECT role FROM users WHERE id = ?")
        .bind(&body.tenant_id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Tenant not found".to_string()))?;

    if Role::parse(&tenant_role) != Some(Role::Tenant) {
        return Err(AppError::Validation(
            "Lease tenant must have the tenant role".to_string(),
        ));
    }

    if let Some(unit_id) = &body.unit_id {
        let unit_property = sqlx::query_scalar::<_, String>(
            "SELECT property_id FROM units WHERE id = ?",
        )
        .bind(unit_id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Unit not found".to_string()))?;

        if unit_property != body.property_id {
            return Err(AppError::Validation(
                "Unit does not belong to this property".to_string(),
            ));
        }
    }

    if has_active_lease(&state, &body.tenant_id, &body.property_id).await? {
        return Err(AppError::Conflict(
            "Tenant already has an active lease on this property".to_string(),
        ));
    }

    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO leases (id, tenant_id, property_id, unit_id, status, rent_amount_cents,
                             start_date, end_date, created_at, updated_at)
         VALUES (?, ?, ?, ?, 'draft', ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&body.tenant_id)
    .bind(&body.property_id)
    .bind(&body.unit_id)
    .bind(body.rent_amount_cents)
    .bind(&body.start_date)
    .bind(&body.end_date)
    .bind(&now)
    .bind(&now)
    .execute(&state.db.pool)
    .await?;

    let lease = fetch_lease(&state, &id).await?;
    Ok(Json(lease))
}

async fn get_lease(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Lease>> {
    let lease = fetch_lease(&state, &id).await?;

    if user.role == Role::Tenant {
        if lease.tenant_id != user.id {
            return Err(AppError::NotFound("Lease not found".to_string()));
        }
    } else {
        fetch_owned_property(&state, &user, &lease.property_id).await?;
    }

    Ok(Json(lease))
}

async fn activate_lease(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Lease>> {
    user.require_landlord()?;
    let lease = fetch_managed_lease(&state, &user, &id).await?;

    if !["draft", "pending"].contains(&lease.status.as_str()) {
        return Err(AppError::Conflict(format!(
            "Cannot activate a lease in status '{}'",
            lease.status
        )));
    }

    // Re-checked here because another lease may have gone active since
    // this one was drafted.
    if has_active_lease(&state, &lease.tenant_id, &lease.property_id).await? {
        return Err(AppError::Conflict(
            "Tenant already has an active lease on this property".to_string(),
        ));
    }

    let now = Utc::now().to_rfc3339();
    sqlx::query("UPDATE leases SET status = 'active', updated_at = ? WHERE id = ?")
        .bind(&now)
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    if let Some(unit_id) = &lease.unit_id {
        sqlx::query("UPDATE units SET status = 'occupied', updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(unit_id)
            .execute(&state.db.pool)
            .await?;
    }

    notify::notify(
        &state.db.pool,
        &lease.tenant_id,
        "lease",
        "Your lease is now active",
        Some(&lease.property_id),
    )
    .await?;

    let lease = fetch_lease(&state, &id).await?;
    Ok(Json(lease))
}

async fn end_lease(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Lease>> {
    user.require_landlord()?;
    let lease = fetch_managed_lease(&state, &user, &id).await?;

    if lease.status != "active" {
        return Err(AppError::Conflict(format!(
            "Cannot end a lease in status '{}'",
            lease.status
        )));
    }

    let now = Utc::now().to_rfc3339();
    sqlx::query("UPDATE leases SET status = 'ended', end_date = ?, updated_at = ? WHERE id = ?")
        .bind(&now)
        .bind(&now)
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    if let Some(unit_id) = &lease.unit_id {
        sqlx::query("UPDATE units SET status = 'available', updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(unit_id)
            .execute(&state.db.pool)
            .await?;
    }

    let lease = fetch_lease(&state, &id).await?;
    Ok(Json(lease))
}

async fn delete_lease(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    user.require_landlord()?;
    let lease = fetch_managed_lease(&state, &user, &id).await?;

    // Active and ended leases are part of the payment history and stay.
    if !["draft", "pending"].contains(&lease.status.as_str()) {
        return Err(AppError::Conflict(
            "Only draft or pending leases can be deleted".to_string(),
        ));
    }

    sqlx::query("DELETE FROM leases WHERE id = ?")
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    Ok(Json(serde_json::json!({ "status": "deleted" })))
}
