use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;

use crate::{
    db::models::User,
    error::{AppError, Result},
    middleware::auth::AuthUser,
    util::pagination::{PageParams, Paginated},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/:id/deactivate", post(deactivate_user))
        .route("/users/:id/activate", post(activate_user))
}

async fn list_users(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<PageParams>,
) -> Result<Json<Paginated<User>>> {
    user.require_admin()?;

    let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
        .fetch_one(&state.db.pool)
        .await?;

    // Sensitive columns are skipped at serialization by the model.
    let users = sqlx::query_as::<_, User>(
        "SELECT * FROM users ORDER BY created_at DESC LIMIT ? OFFSET ?",
    )
    .bind(params.limit())
    .bind(params.offset())
    .fetch_all(&state.db.pool)
    .await?;

    Ok(Json(Paginated::new(users, total, &params)))
}

async fn deactivate_user(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    user.require_admin()?;

    if id == user.id {
        return Err(AppError::Validation(
            "Cannot deactivate your own account".to_string(),
        ));
    }

    set_active(&state, &id, false).await?;
    Ok(Json(json!({ "status": "deactivated" })))
}

async fn activate_user(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    user.require_admin()?;

    set_active(&state, &id, true).await?;
    Ok(Json(json!({ "status": "activated" })))
}

async fn set_active(state: &AppState, user_id: &str, active: bool) -> Result<()> {
    let updated = sqlx::query("UPDATE users SET is_active = ?, updated_at = ? WHERE id = ?")
        .bind(active)
        .bind(Utc::now().to_rfc3339())
        .bind(user_id)
        .execute(&state.db.pool)
        .await?;

    if updated.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }
    Ok(())
}
