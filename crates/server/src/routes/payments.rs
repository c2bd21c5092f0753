use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    db::models::{Invoice, Payment, Role},
    error::{AppError, Result},
    middleware::auth::AuthUser,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_payments).post(create_payment))
        .route("/:id", get(get_payment))
}

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub invoice_id: String,
    pub payment_intent_id: String,
}

async fn list_payments(State(state): State<AppState>, user: AuthUser) -> Result<Json<Vec<Payment>>> {
    let payments = match user.role {
        Role::Admin => {
            sqlx::query_as::<_, Payment>("SELECT * FROM payments ORDER BY created_at DESC")
                .fetch_all(&state.db.pool)
                .await?
        }
        Role::Landlord => {
            sqlx::query_as::<_, Payment>(
                "SELECT * FROM payments WHERE landlord_id = ? ORDER BY created_at DESC",
            )
            .bind(&user.id)
            .fetch_all(&state.db.pool)
            .await?
        }
        Role::Tenant => {
            sqlx::query_as::<_, Payment>(
                "SELECT * FROM payments WHERE tenant_id = ? ORDER BY created_at DESC",
            )
            .bind(&user.id)
            .fetch_all(&state.db.pool)
            .await?
        }
    };

    Ok(Json(payments))
}

/// Records the pending payment behind a checkout session. The payment only
/// moves to 'paid' through the webhook path.
async fn create_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CreatePaymentRequest>,
) -> Result<Json<Payment>> {
    if user.role != Role::Tenant {
        return Err(AppError::Forbidden(
            "Only tenants can initiate payments".to_string(),
        ));
    }
    if body.payment_intent_id.trim().is_empty() {
        return Err(AppError::Validation(
            "payment_intent_id is required".to_string(),
        ));
    }

    let invoice = sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = ?")
        .bind(&body.invoice_id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Invoice not found".to_string()))?;

    if invoice.tenant_id != user.id {
        return Err(AppError::NotFound("Invoice not found".to_string()));
    }
    if invoice.status == "paid" {
        return Err(AppError::Conflict("Invoice is already paid".to_string()));
    }

    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    let inserted = sqlx::query(
        "INSERT INTO payments (id, payment_intent_id, tenant_id, landlord_id, invoice_id,
                               amount_cents, currency, status, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', ?)",
    )
    .bind(&id)
    .bind(&body.payment_intent_id)
    .bind(&invoice.tenant_id)
    .bind(&invoice.landlord_id)
    .bind(&invoice.id)
    .bind(invoice.amount_cents)
    .bind(&invoice.currency)
    .bind(&now)
    .execute(&state.db.pool)
    .await
    .map_err(AppError::from);

    if let Err(err) = inserted {
        if err.is_unique_violation() {
            return Err(AppError::Conflict(
                "A payment already exists for this payment intent".to_string(),
            ));
        }
        return Err(err);
    }

    let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db.pool)
        .await?;

    Ok(Json(payment))
}

async fn get_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Payment>> {
    let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))?;

    let is_party = payment.tenant_id == user.id || payment.landlord_id == user.id;
    if !is_party && user.role != Role::Admin {
        return Err(AppError::NotFound("Payment not found".to_string()));
    }

    Ok(Json(payment))
}
