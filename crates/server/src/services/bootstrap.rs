use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{db::models::Role, error::Result, routes::auth::hash_password, util::mask::mask_email};

/// Provisions the admin account named by ADMIN_EMAIL/ADMIN_PASSWORD at
/// startup. Admins cannot self-register, so this is the only way one comes
/// into existence. A no-op when the account already exists.
pub async fn bootstrap_admin(pool: &SqlitePool, email: &str, password: &str) -> Result<()> {
    let existing = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE email = ?")
        .bind(email)
        .fetch_one(pool)
        .await?;

    if existing > 0 {
        return Ok(());
    }

    let now = Utc::now().to_rfc3339();
    sqlx::query(
        "INSERT INTO users (id, email, name, password_hash, role, is_active, is_verified,
                            failed_login_attempts, created_at, updated_at)
         VALUES (?, ?, 'Administrator', ?, ?, 1, 1, 0, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(email)
    .bind(hash_password(password)?)
    .bind(Role::Admin.as_str())
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    tracing::info!(email = %mask_email(email), "provisioned admin account");
    Ok(())
}
