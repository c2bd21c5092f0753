use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    db::models::{Invoice, Role},
    error::{AppError, Result},
    middleware::auth::AuthUser,
    routes::properties::fetch_owned_property,
    services::notify,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_invoices).post(create_invoice))
        .route("/:id", get(get_invoice))
}

#[derive(Debug, Deserialize)]
pub struct CreateInvoiceRequest {
    pub tenant_id: String,
    pub property_id: String,
    pub amount_cents: i64,
    pub currency: Option<String>,
    pub due_date: String,
}

/// Flips pending/due invoices past their due date to overdue before a read.
async fn refresh_overdue(state: &AppState) -> Result<()> {
    let today = Utc::now().date_naive().to_string();
    sqlx::query(
        "UPDATE invoices SET status = 'overdue'
         WHERE status IN ('pending', 'due') AND due_date < ?",
    )
    .bind(&today)
    .execute(&state.db.pool)
    .await?;
    Ok(())
}

async fn list_invoices(State(state): State<AppState>, user: AuthUser) -> Result<Json<Vec<Invoice>>> {
    refresh_overdue(&state).await?;

    let invoices = match user.role {
        Role::Admin => {
            sqlx::query_as::<_, Invoice>("SELECT * FROM invoices ORDER BY created_at DESC")
                .fetch_all(&state.db.pool)
                .await?
        }
        Role::Landlord => {
            sqlx::query_as::<_, Invoice>(
                "SELECT * FROM invoices WHERE landlord_id = ? ORDER BY created_at DESC",
            )
            .bind(&user.id)
            .fetch_all(&state.db.pool)
            .await?
        }
        Role::Tenant => {
            sqlx::query_as::<_, Invoice>(
                "SELECT * FROM invoices WHERE tenant_id = ? ORDER BY created_at DESC",
            )
            .bind(&user.id)
            .fetch_all(&state.db.pool)
            .await?
        }
    };

    Ok(Json(invoices))
}

async fn create_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CreateInvoiceRequest>,
) -> Result<Json<Invoice>> {
    user.require_landlord()?;
    let property = fetch_owned_property(&state, &user, &body.property_id).await?;

    if body.amount_cents <= 0 {
        return Err(AppError::Validation("Amount must be positive".to_string()));
    }
    if NaiveDate::parse_from_str(&body.due_date, "%Y-%m-%d").is_err() {
        return Err(AppError::Validation(
            "Due date must be YYYY-MM-DD".to_string(),
        ));
    }

    let leased = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM leases WHERE tenant_id = ? AND property_id = ? AND status = 'active'",
    )
    .bind(&body.tenant_id)
    .bind(&body.property_id)
    .fetch_one(&state.db.pool)
    .await?;

    if leased == 0 {
        return Err(AppError::Validation(
            "Tenant has no active lease on this property".to_string(),
        ));
    }

    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    let currency = body.currency.as_deref().unwrap_or("usd");

    sqlx::query(
        "INSERT INTO invoices (id, tenant_id, landlord_id, property_id, amount_cents, currency,
                               due_date, status, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', ?)",
    )
    .bind(&id)
    .bind(&body.tenant_id)
    .bind(&property.landlord_id)
    .bind(&body.property_id)
    .bind(body.amount_cents)
    .bind(currency)
    .bind(&body.due_date)
    .bind(&now)
    .execute(&state.db.pool)
    .await?;

    notify::notify(
        &state.db.pool,
        &body.tenant_id,
        "invoice",
        &format!(
            "New invoice of {:.2} {currency} due {}",
            body.amount_cents as f64 / 100.0,
            body.due_date
        ),
        Some(&body.property_id),
    )
    .await?;

    let invoice = sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db.pool)
        .await?;

    Ok(Json(invoice))
}

async fn get_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Invoice>> {
    refresh_overdue(&state).await?;

    let invoice = sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Invoice not found".to_string()))?;

    let is_party = invoice.tenant_id == user.id || invoice.landlord_id == user.id;
    if !is_party && user.role != Role::Admin {
        return Err(AppError::NotFound("Invoice not found".to_string()));
    }

    Ok(Json(invoice))
}
