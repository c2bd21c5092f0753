use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    db::models::{Property, Role},
    error::{AppError, Result},
    middleware::auth::AuthUser,
    routes::units,
    util::pagination::{PageParams, Paginated},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_properties).post(create_property))
        .route(
            "/:id",
            get(get_property).put(update_property).delete(delete_property),
        )
        .route("/:id/units", get(units::list_units).post(units::create_unit))
}

#[derive(Debug, Deserialize)]
pub struct CreatePropertyRequest {
    pub name: String,
    pub address_line1: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub property_type: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePropertyRequest {
    pub name: Option<String>,
    pub address_line1: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub property_type: Option<String>,
    pub status: Option<String>,
}

/// Loads a property the user may at least read: the owning landlord, an
/// admin, or a tenant with an active lease on it.
pub async fn fetch_accessible_property(
    state: &AppState,
    user: &AuthUser,
    property_id: &str,
) -> Result<Property> {
    let property = sqlx::query_as::<_, Property>("SELECT * FROM properties WHERE id = ?")
        .bind(property_id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Property not found".to_string()))?;

    if user.owns(&property.landlord_id) {
        return Ok(property);
    }

    if user.role == Role::Tenant {
        let leased = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM leases WHERE tenant_id = ? AND property_id = ? AND status = 'active'",
        )
        .bind(&user.id)
        .bind(property_id)
        .fetch_one(&state.db.pool)
        .await?;
        if leased > 0 {
            return Ok(property);
        }
    }

    Err(AppError::NotFound("Property not found".to_string()))
}

/// Loads a property the user may mutate: owner or admin only.
pub async fn fetch_owned_property(
    state: &AppState,
    user: &AuthUser,
    property_id: &str,
) -> Result<Property> {
    let property = sqlx::query_as::<_, Property>("SELECT * FROM properties WHERE id = ?")
        .bind(property_id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Property not found".to_string()))?;

    if !user.owns(&property.landlord_id) {
        return Err(AppError::Forbidden(
            "You do not manage this property".to_string(),
        ));
    }

    Ok(property)
}

async fn list_properties(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<PageParams>,
) -> Result<Json<Paginated<Property>>> {
    let (total, properties) = match user.role {
        Role::Admin => {
            let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM properties")
                .fetch_one(&state.db.pool)
                .await?;
            let rows = sqlx::query_as::<_, Property>(
                "SELECT * FROM properties ORDER BY created_at DESC LIMIT ? OFFSET ?",
            )
            .bind(params.limit())
            .bind(params.offset())
            .fetch_all(&state.db.pool)
            .await?;
            (total, rows)
        }
        Role::Landlord => {
            let total = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM properties WHERE landlord_id = ?",
            )
            .bind(&user.id)
            .fetch_one(&state.db.pool)
            .await?;
            let rows = sqlx::query_as::<_, Property>(
                "SELECT * FROM properties WHERE landlord_id = ?
                 ORDER BY created_at DESC LIMIT ? OFFSET ?",
            )
            .bind(&user.id)
            .bind(params.limit())
            .bind(params.offset())
            .fetch_all(&state.db.pool)
            .await?;
            (total, rows)
        }
        Role::Tenant => {
            let total = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(DISTINCT p.id) FROM properties p
                 JOIN leases l ON l.property_id = p.id
                 WHERE l.tenant_id = ? AND l.status = 'active'",
            )
            .bind(&user.id)
            .fetch_one(&state.db.pool)
            .await?;
            let rows = sqlx::query_as::<_, Property>(
                "SELECT DISTINCT p.* FROM properties p
                 JOIN leases l ON l.property_id = p.id
                 WHERE l.tenant_id = ? AND l.status = 'active'
                 ORDER BY p.created_at DESC LIMIT ? OFFSET ?",
            )
            .bind(&user.id)
            .bind(params.limit())
            .bind(params.offset())
            .fetch_all(&state.db.pool)
            .await?;
            (total, rows)
        }
    };

    Ok(Json(Paginated::new(properties, total, &params)))
}

async fn create_property(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CreatePropertyRequest>,
) -> Result<Json<Property>> {
    user.require_landlord()?;

    if body.name.trim().is_empty() {
        return Err(AppError::Validation("Property name is required".to_string()));
    }
    if body.address_line1.trim().is_empty() {
        return Err(AppError::Validation("Address is required".to_string()));
    }

    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO properties (id, landlord_id, name, address_line1, city, state, postal_code,
                                 property_type, status, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'active', ?, ?)",
    )
    .bind(&id)
    .bind(&user.id)
    .bind(&body.name)
    .bind(&body.address_line1)
    .bind(&body.city)
    .bind(&body.state)
    .bind(&body.postal_code)
    .bind(&body.property_type)
    .bind(&now)
    .bind(&now)
    .execute(&state.db.pool)
    .await?;

    let property = sqlx::query_as::<_, Property>("SELECT * FROM properties WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db.pool)
        .await?;

    Ok(Json(property))
}

async fn get_property(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Property>> {
    let property = fetch_accessible_property(&state, &user, &id).await?;
    Ok(Json(property))
}

async fn update_property(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdatePropertyRequest>,
) -> Result<Json<Property>> {
    user.require_landlord()?;
    let property = fetch_owned_property(&state, &user, &id).await?;

    if let Some(status) = &body.status {
        if !["active", "inactive"].contains(&status.as_str()) {
            return Err(AppError::Validation(
                "Status must be 'active' or 'inactive'".to_string(),
            ));
        }
    }

    let now = Utc::now().to_rfc3339();
    sqlx::query(
        "UPDATE properties
         SET name = ?, address_line1 = ?, city = ?, state = ?, postal_code = ?,
             property_type = ?, status = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(body.name.as_deref().unwrap_or(&property.name))
    .bind(body.address_line1.as_deref().unwrap_or(&property.address_line1))
    .bind(body.city.as_deref().unwrap_or(&property.city))
    .bind(body.state.as_deref().unwrap_or(&property.state))
    .bind(body.postal_code.as_deref().unwrap_or(&property.postal_code))
    .bind(body.property_type.as_deref().unwrap_or(&property.property_type))
    .bind(body.status.as_deref().unwrap_or(&property.status))
    .bind(&now)
    .bind(&id)
    .execute(&state.db.pool)
    .await?;

    let property = sqlx::query_as::<_, Property>("SELECT * FROM properties WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db.pool)
        .await?;

    Ok(Json(property))
}

async fn delete_property(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    user.require_landlord()?;
    fetch_owned_property(&state, &user, &id).await?;

    let active_leases = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM leases WHERE property_id = ? AND status = 'active'",
    )
    .bind(&id)
    .fetch_one(&state.db.pool)
    .await?;

    if active_leases > 0 {
        return Err(AppError::Conflict(
            "Property has active leases and cannot be deleted".to_string(),
        ));
    }

    sqlx::query("DELETE FROM properties WHERE id = ?")
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    Ok(Json(serde_json::json!({ "status": "deleted" })))
}
