use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use chrono::Utc;
use serde_json::json;

use crate::{
    error::{AppError, Result},
    services::stripe,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/webhook", post(webhook))
}

/// Stripe webhook ingestion. Signature failures reject with 400 before any
/// persistence; everything after the event is accepted into the ledger
/// answers 200, because Stripe retries on non-2xx and a local processing
/// problem must not cause a redelivery storm.
async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>> {
    let signature = headers
        .get("Stripe-Signature")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::Validation("Missing Stripe-Signature header".to_string()))?;

    stripe::verify_signature(
        &state.config.stripe_webhook_secret,
        signature,
        &body,
        Utc::now().timestamp(),
    )
    .map_err(|err| AppError::Validation(format!("Invalid webhook signature: {err}")))?;

    let payload = std::str::from_utf8(&body)
        .map_err(|_| AppError::Validation("Webhook body is not valid UTF-8".to_string()))?;
    let event: serde_json::Value = serde_json::from_str(payload)
        .map_err(|_| AppError::Validation("Webhook body is not valid JSON".to_string()))?;

    let event_id = event
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| AppError::Validation("Event is missing an id".to_string()))?;
    let event_type = event
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| AppError::Validation("Event is missing a type".to_string()))?;

    let fresh = stripe::record_event(&state.db.pool, event_id, event_type, payload).await?;
    if !fresh {
        tracing::info!(event_id, "duplicate webhook delivery, skipping");
        return Ok(Json(json!({ "received": true, "duplicate": true })));
    }

    let object = event
        .get("data")
        .and_then(|d| d.get("object"))
        .cloned()
        .unwrap_or(serde_json::Value::Null);

    match stripe::process_event(&state.db.pool, event_type, &object).await {
        Ok(()) => {
            stripe::mark_processed(&state.db.pool, event_id).await?;
        }
        Err(err) => {
            // Accepted but not applied; the ledger entry keeps the retry
            // from double-applying if Stripe redelivers anyway.
            tracing::error!(event_id, event_type, "webhook processing failed: {err}");
        }
    }

    Ok(Json(json!({ "received": true })))
}
