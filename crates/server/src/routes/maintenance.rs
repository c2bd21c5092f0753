use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    db::models::{MaintenanceRequest, Role},
    error::{AppError, Result},
    middleware::auth::AuthUser,
    routes::properties::fetch_owned_property,
    services::notify,
    AppState,
};

const PRIORITIES: [&str; 4] = ["low", "medium", "high", "urgent"];
const STATUSES: [&str; 3] = ["open", "in_progress", "completed"];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_requests).post(create_request))
        .route("/:id", get(get_request))
        .route("/:id/status", put(update_status))
}

#[derive(Debug, Deserialize)]
pub struct CreateRequestBody {
    pub property_id: String,
    pub unit_id: Option<String>,
    pub title: String,
    pub description: String,
    pub priority: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusBody {
    pub status: String,
}

async fn fetch_request(state: &AppState, id: &str) -> Result<MaintenanceRequest> {
    sqlx::query_as::<_, MaintenanceRequest>("SELECT * FROM maintenance_requests WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Maintenance request not found".to_string()))
}

async fn list_requests(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<MaintenanceRequest>>> {
    let requests = match user.role {
        Role::Admin => {
            sqlx::query_as::<_, MaintenanceRequest>(
                "SELECT * FROM maintenance_requests ORDER BY created_at DESC",
            )
            .fetch_all(&state.db.pool)
            .await?
        }
        Role::Landlord => {
            sqlx::query_as::<_, MaintenanceRequest>(
                "SELECT m.* FROM maintenance_requests m
                 JOIN properties p ON m.property_id = p.id
                 WHERE p.landlord_id = ?
                 ORDER BY m.created_at DESC",
            )
            .bind(&user.id)
            .fetch_all(&state.db.pool)
            .await?
        }
        Role::Tenant => {
            sqlx::query_as::<_, MaintenanceRequest>(
                "SELECT * FROM maintenance_requests WHERE tenant_id = ? ORDER BY created_at DESC",
            )
            .bind(&user.id)
            .fetch_all(&state.db.pool)
            .await?
        }
    };

    Ok(Json(requests))
}

async fn create_request(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CreateRequestBody>,
) -> Result<Json<MaintenanceRequest>> {
    if user.role != Role::Tenant {
        return Err(AppError::Forbidden(
            "Only tenants can file maintenance requests".to_string(),
        ));
    }
    if body.title.trim().is_empty() {
        return Err(AppError::Validation("Title is required".to_string()));
    }

    let priority = body.priority.as_deref().unwrap_or("medium");
    if !PRIORITIES.contains(&priority) {
        return Err(AppError::Validation(
            "Priority must be 'low', 'medium', 'high' or 'urgent'".to_string(),
        ));
    }

    // The tenant must hold an active lease on the property.
    let leased = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM leases WHERE tenant_id = ? AND property_id = ? AND status = 'active'",
    )
    .bind(&user.id)
    .bind(&body.property_id)
    .fetch_one(&state.db.pool)
    .await?;

    if leased == 0 {
        return Err(AppError::Forbidden(
            "You do not have an active lease on this property".to_string(),
        ));
    }

    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO maintenance_requests (id, property_id, unit_id, tenant_id, title, description,
                                           status, priority, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, 'open', ?, ?, ?)",
    )
    .bind(&id)
    .bind(&body.property_id)
    .bind(&body.unit_id)
    .bind(&user.id)
    .bind(&body.title)
    .bind(&body.description)
    .bind(priority)
    .bind(&now)
    .bind(&now)
    .execute(&state.db.pool)
    .await?;

    // Tell the landlord a request came in.
    let landlord_id =
        sqlx::query_scalar::<_, String>("SELECT landlord_id FROM properties WHERE id = ?")
            .bind(&body.property_id)
            .fetch_one(&state.db.pool)
            .await?;

    notify::notify(
        &state.db.pool,
        &landlord_id,
        "maintenance",
        &format!("New maintenance request: {}", body.title),
        Some(&body.property_id),
    )
    .await?;

    let request = fetch_request(&state, &id).await?;
    Ok(Json(request))
}

async fn get_request(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MaintenanceRequest>> {
    let request = fetch_request(&state, &id).await?;

    match user.role {
        Role::Tenant if request.tenant_id != user.id => {
            Err(AppError::NotFound("Maintenance request not found".to_string()))
        }
        Role::Landlord => {
            fetch_owned_property(&state, &user, &request.property_id).await?;
            Ok(Json(request))
        }
        _ => Ok(Json(request)),
    }
}

async fn update_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateStatusBody>,
) -> Result<Json<MaintenanceRequest>> {
    user.require_landlord()?;
    let request = fetch_request(&state, &id).await?;
    fetch_owned_property(&state, &user, &request.property_id).await?;

    if !STATUSES.contains(&body.status.as_str()) {
        return Err(AppError::Validation(
            "Status must be 'open', 'in_progress' or 'completed'".to_string(),
        ));
    }

    let now = Utc::now().to_rfc3339();
    let completed_at = (body.status == "completed").then(|| now.clone());

    sqlx::query(
        "UPDATE maintenance_requests SET status = ?, completed_at = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&body.status)
    .bind(&completed_at)
    .bind(&now)
    .bind(&id)
    .execute(&state.db.pool)
    .await?;

    notify::notify(
        &state.db.pool,
        &request.tenant_id,
        "maintenance",
        &format!("Maintenance request '{}' is now {}", request.title, body.status),
        Some(&request.property_id),
    )
    .await?;

    let request = fetch_request(&state, &id).await?;
    Ok(Json(request))
}
