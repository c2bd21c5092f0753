use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
    db::models::Message,
    error::{AppError, Result},
    middleware::auth::AuthUser,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(send_message))
        .route("/conversation/:user_id", get(get_conversation))
        .route("/unread-count", get(unread_count))
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub receiver_id: String,
    pub property_id: Option<String>,
    pub content: String,
}

async fn send_message(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<SendMessageRequest>,
) -> Result<Json<Message>> {
    if body.content.trim().is_empty() {
        return Err(AppError::Validation("Message content is required".to_string()));
    }
    if body.receiver_id == user.id {
        return Err(AppError::Validation(
            "Cannot send a message to yourself".to_string(),
        ));
    }

    let receiver_exists =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE id = ? AND is_active = 1")
            .bind(&body.receiver_id)
            .fetch_one(&state.db.pool)
            .await?;

    if receiver_exists == 0 {
        return Err(AppError::NotFound("Recipient not found".to_string()));
    }

    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO messages (id, sender_id, receiver_id, property_id, content, is_read, created_at)
         VALUES (?, ?, ?, ?, ?, 0, ?)",
    )
    .bind(&id)
    .bind(&user.id)
    .bind(&body.receiver_id)
    .bind(&body.property_id)
    .bind(&body.content)
    .bind(&now)
    .execute(&state.db.pool)
    .await?;

    let message = sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db.pool)
        .await?;

    Ok(Json(message))
}

async fn get_conversation(
    State(state): State<AppState>,
    user: AuthUser,
    Path(other_id): Path<String>,
) -> Result<Json<Vec<Message>>> {
    let messages = sqlx::query_as::<_, Message>(
        "SELECT * FROM messages
         WHERE (sender_id = ? AND receiver_id = ?) OR (sender_id = ? AND receiver_id = ?)
         ORDER BY created_at ASC",
    )
    .bind(&user.id)
    .bind(&other_id)
    .bind(&other_id)
    .bind(&user.id)
    .fetch_all(&state.db.pool)
    .await?;

    // Fetching a conversation marks the received side as read.
    sqlx::query("UPDATE messages SET is_read = 1 WHERE sender_id = ? AND receiver_id = ?")
        .bind(&other_id)
        .bind(&user.id)
        .execute(&state.db.pool)
        .await?;

    Ok(Json(messages))
}

async fn unread_count(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<serde_json::Value>> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM messages WHERE receiver_id = ? AND is_read = 0",
    )
    .bind(&user.id)
    .fetch_one(&state.db.pool)
    .await?;

    Ok(Json(json!({ "unread": count })))
}
