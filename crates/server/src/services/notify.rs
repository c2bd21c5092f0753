use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::Result;

/// Inserts a notification row for a user. Called from maintenance and
/// payment flows; failures propagate to the caller.
pub async fn notify(
    pool: &SqlitePool,
    user_id: &str,
    kind: &str,
    message: &str,
    property_id: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO notifications (id, user_id, message, kind, property_id, is_read, created_at)
         VALUES (?, ?, ?, ?, ?, 0, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(message)
    .bind(kind)
    .bind(property_id)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}
