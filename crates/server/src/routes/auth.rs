use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    db::models::{Role, User},
    error::{AppError, Result},
    middleware::auth::AuthUser,
    util::{mask::mask_email, password::validate_password},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/verify", post(verify))
}

/// Routes that require an authenticated user; mounted behind the auth
/// middleware.
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/me", get(me))
        .route("/change-password", post(change_password))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub password: String,
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserResponse,
}

/// Registration additionally returns the email-verification token; mail
/// delivery is out of scope, so the caller relays it.
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub token: String,
    pub verification_token: String,
    pub user: UserResponse,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub email: String,
    pub role: String,
    pub exp: usize,
}

const VERIFY_PURPOSE: &str = "email_verify";
const VERIFY_TTL_HOURS: i64 = 24;

/// Claims for the single-purpose email verification token. The purpose
/// field keeps a session token from doubling as a verification token.
#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyClaims {
    pub sub: String,
    pub purpose: String,
    pub exp: usize,
}

pub(crate) fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|_| AppError::Internal("Failed to hash password".to_string()))
}

fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

fn create_token(user_id: &str, email: &str, role: Role, state: &AppState) -> Result<String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::hours(state.config.token_ttl_hours))
        .ok_or_else(|| AppError::Internal("Token expiry overflow".to_string()))?
        .timestamp() as usize;

    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        role: role.as_str().to_string(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.config.jwt_secret.as_bytes()),
    )
    .map_err(|_| AppError::Internal("Failed to create token".to_string()))
}

fn create_verify_token(user_id: &str, state: &AppState) -> Result<String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::hours(VERIFY_TTL_HOURS))
        .ok_or_else(|| AppError::Internal("Token expiry overflow".to_string()))?
        .timestamp() as usize;

    let claims = VerifyClaims {
        sub: user_id.to_string(),
        purpose: VERIFY_PURPOSE.to_string(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.config.jwt_secret.as_bytes()),
    )
    .map_err(|_| AppError::Internal("Failed to create token".to_string()))
}

async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>> {
    if body.email.is_empty() || !body.email.contains('@') {
        return Err(AppError::Validation("Invalid email address".to_string()));
    }
    if body.name.trim().is_empty() {
        return Err(AppError::Validation("Name is required".to_string()));
    }
    validate_password(&body.password).map_err(AppError::Validation)?;

    // Admin accounts are provisioned out of band, never via self-signup.
    let role = match Role::parse(&body.role) {
        Some(Role::Landlord) => Role::Landlord,
        Some(Role::Tenant) => Role::Tenant,
        _ => {
            return Err(AppError::Validation(
                "Role must be 'landlord' or 'tenant'".to_string(),
            ))
        }
    };

    let password_hash = hash_password(&body.password)?;
    let user_id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    // The unique index on email is the authority on duplicates; a
    // read-then-insert check would race concurrent registrations.
    let inserted = sqlx::query(
        "INSERT INTO users (id, email, name, password_hash, role, is_active, is_verified,
                            failed_login_attempts, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, 1, 0, 0, ?, ?)",
    )
    .bind(&user_id)
    .bind(&body.email)
    .bind(&body.name)
    .bind(&password_hash)
    .bind(role.as_str())
    .bind(&now)
    .bind(&now)
    .execute(&state.db.pool)
    .await
    .map_err(AppError::from);

    if let Err(err) = inserted {
        if err.is_unique_violation() {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }
        return Err(err);
    }

    tracing::info!(email = %mask_email(&body.email), role = role.as_str(), "registered user");

    let token = create_token(&user_id, &body.email, role, &state)?;
    let verification_token = create_verify_token(&user_id, &state)?;

    Ok(Json(RegisterResponse {
        token,
        verification_token,
        user: UserResponse {
            id: user_id,
            email: body.email,
            name: body.name,
            role: role.as_str().to_string(),
        },
    }))
}

/// Marks the account behind a verification token as verified.
async fn verify(
    State(state): State<AppState>,
    Json(body): Json<VerifyRequest>,
) -> Result<Json<serde_json::Value>> {
    let token_data = decode::<VerifyClaims>(
        &body.token,
        &DecodingKey::from_secret(state.config.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Validation("Invalid or expired verification token".to_string()))?;

    if token_data.claims.purpose != VERIFY_PURPOSE {
        return Err(AppError::Validation(
            "Invalid or expired verification token".to_string(),
        ));
    }

    let updated = sqlx::query("UPDATE users SET is_verified = 1, updated_at = ? WHERE id = ?")
        .bind(Utc::now().to_rfc3339())
        .bind(&token_data.claims.sub)
        .execute(&state.db.pool)
        .await?;

    if updated.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    Ok(Json(serde_json::json!({ "status": "verified" })))
}

async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(&body.email)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if !user.is_active {
        return Err(AppError::Forbidden("Account is deactivated".to_string()));
    }

    // Lockout applies before password verification so a correct password
    // cannot be used to probe whether the lock is still in force.
    if let Some(locked_until) = user
        .locked_until
        .as_deref()
        .and_then(crate::util::dates::parse_ts)
    {
        if locked_until > Utc::now() {
            return Err(AppError::Forbidden(
                "Account temporarily locked due to failed login attempts".to_string(),
            ));
        }
    }

    if !verify_password(&body.password, &user.password_hash)? {
        let attempts = user.failed_login_attempts + 1;
        if attempts >= state.config.lockout_threshold {
            let until = Utc::now() + Duration::minutes(state.config.lockout_minutes);
            sqlx::query(
                "UPDATE users SET failed_login_attempts = ?, locked_until = ? WHERE id = ?",
            )
            .bind(attempts)
            .bind(until.to_rfc3339())
            .bind(&user.id)
            .execute(&state.db.pool)
            .await?;
            tracing::warn!(email = %mask_email(&user.email), "account locked after repeated failures");
        } else {
            sqlx::query("UPDATE users SET failed_login_attempts = ? WHERE id = ?")
                .bind(attempts)
                .bind(&user.id)
                .execute(&state.db.pool)
                .await?;
        }
        return Err(AppError::Unauthorized);
    }

    if user.failed_login_attempts > 0 || user.locked_until.is_some() {
        sqlx::query("UPDATE users SET failed_login_attempts = 0, locked_until = NULL WHERE id = ?")
            .bind(&user.id)
            .execute(&state.db.pool)
            .await?;
    }

    let role = Role::parse(&user.role)
        .ok_or_else(|| AppError::Internal(format!("Unknown role in database: {}", user.role)))?;

    let token = create_token(&user.id, &user.email, role, &state)?;

    Ok(Json(AuthResponse {
        token,
        user: UserResponse {
            id: user.id,
            email: user.email,
            name: user.name,
            role: user.role,
        },
    }))
}

async fn me(State(state): State<AppState>, user: AuthUser) -> Result<Json<UserResponse>> {
    let row = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(&user.id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(UserResponse {
        id: row.id,
        email: row.email,
        name: row.name,
        role: row.role,
    }))
}

async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<Json<serde_json::Value>> {
    let row = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(&user.id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if !verify_password(&body.current_password, &row.password_hash)? {
        return Err(AppError::Forbidden(
            "Current password is incorrect".to_string(),
        ));
    }
    validate_password(&body.new_password).map_err(AppError::Validation)?;

    let password_hash = hash_password(&body.new_password)?;
    sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(&password_hash)
        .bind(Utc::now().to_rfc3339())
        .bind(&user.id)
        .execute(&state.db.pool)
        .await?;

    Ok(Json(serde_json::json!({ "status": "ok" })))
}
