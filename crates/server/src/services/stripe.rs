use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{db::models::Payment, error::Result, services::notify};

type HmacSha256 = Hmac<Sha256>;

/// Maximum allowed skew between the signature timestamp and our clock.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SignatureError {
    #[error("malformed Stripe-Signature header")]
    Malformed,
    #[error("signature timestamp outside tolerance")]
    Expired,
    #[error("no signature matched")]
    Mismatch,
}

/// Verifies a `Stripe-Signature` header (`t=...,v1=...`) against the raw
/// request body. The signed message is `"{t}.{body}"`, HMAC-SHA256 with the
/// endpoint secret. Multiple `v1` entries can appear during secret rotation;
/// any match passes.
pub fn verify_signature(
    secret: &str,
    header: &str,
    payload: &[u8],
    now_unix: i64,
) -> std::result::Result<(), SignatureError> {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<&str> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = v.parse().ok(),
            Some(("v1", v)) => candidates.push(v),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if candidates.is_empty() {
        return Err(SignatureError::Malformed);
    }
    if (now_unix - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(SignatureError::Expired);
    }

    for candidate in candidates {
        let Ok(sig) = hex::decode(candidate) else {
            continue;
        };
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| SignatureError::Malformed)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        if mac.verify_slice(&sig).is_ok() {
            return Ok(());
        }
    }

    Err(SignatureError::Mismatch)
}

/// Builds a valid `Stripe-Signature` header for a payload; the counterpart
/// of `verify_signature`, used by the test suite.
pub fn signature_header(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    let sig = hex::encode(mac.finalize().into_bytes());
    format!("t={timestamp},v1={sig}")
}

/// Records an event in the idempotency ledger. Returns false when the event
/// id was already present, in which case the caller must not reprocess.
pub async fn record_event(
    pool: &SqlitePool,
    event_id: &str,
    event_type: &str,
    payload: &str,
) -> Result<bool> {
    let result = sqlx::query(
        "INSERT OR IGNORE INTO stripe_events (id, event_id, event_type, payload, created_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(event_id)
    .bind(event_type)
    .bind(payload)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn mark_processed(pool: &SqlitePool, event_id: &str) -> Result<()> {
    sqlx::query("UPDATE stripe_events SET processed_at = ? WHERE event_id = ?")
        .bind(Utc::now().to_rfc3339())
        .bind(event_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Applies an already-recorded event's side effects. Unknown event types and
/// events referencing no local records are no-ops: Stripe retries on non-2xx,
/// so a record we don't know about must not fail the webhook.
pub async fn process_event(
    pool: &SqlitePool,
    event_type: &str,
    object: &serde_json::Value,
) -> Result<()> {
    match event_type {
        "payment_intent.succeeded" => {
            let Some(intent_id) = object.get("id").and_then(|v| v.as_str()) else {
                tracing::warn!("payment_intent.succeeded without an object id");
                return Ok(());
            };
            settle_payment(pool, intent_id).await
        }
        "invoice.payment_succeeded" => {
            let Some(intent_id) = object.get("payment_intent").and_then(|v| v.as_str()) else {
                tracing::warn!("invoice.payment_succeeded without a payment_intent");
                return Ok(());
            };
            settle_payment(pool, intent_id).await
        }
        other => {
            tracing::debug!(event_type = other, "ignoring unhandled event type");
            Ok(())
        }
    }
}

/// Marks the payment behind a payment intent as paid, settles its linked
/// invoice, and notifies both parties.
async fn settle_payment(pool: &SqlitePool, intent_id: &str) -> Result<()> {
    let payment = sqlx::query_as::<_, Payment>(
        "SELECT * FROM payments WHERE payment_intent_id = ?",
    )
    .bind(intent_id)
    .fetch_optional(pool)
    .await?;

    let Some(payment) = payment else {
        tracing::warn!(intent_id, "no local payment for payment intent");
        return Ok(());
    };

    if payment.status == "paid" {
        return Ok(());
    }

    let now = Utc::now().to_rfc3339();

    sqlx::query("UPDATE payments SET status = 'paid', completed_at = ? WHERE id = ?")
        .bind(&now)
        .bind(&payment.id)
        .execute(pool)
        .await?;

    if let Some(invoice_id) = &payment.invoice_id {
        sqlx::query("UPDATE invoices SET status = 'paid', paid_at = ? WHERE id = ?")
            .bind(&now)
            .bind(invoice_id)
            .execute(pool)
            .await?;
    }

    let amount = format!("{:.2}", payment.amount_cents as f64 / 100.0);
    notify::notify(
        pool,
        &payment.tenant_id,
        "payment",
        &format!("Your payment of {amount} {} was received", payment.currency),
        None,
    )
    .await?;
    notify::notify(
        pool,
        &payment.landlord_id,
        "payment",
        &format!("A payment of {amount} {} was received", payment.currency),
        None,
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";
    const PAYLOAD: &[u8] = br#"{"id":"evt_1","type":"payment_intent.succeeded"}"#;

    #[test]
    fn valid_signature_passes() {
        let now = 1_700_000_000;
        let header = signature_header(SECRET, now, PAYLOAD);
        assert_eq!(verify_signature(SECRET, &header, PAYLOAD, now), Ok(()));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let now = 1_700_000_000;
        let header = signature_header("whsec_other", now, PAYLOAD);
        assert_eq!(
            verify_signature(SECRET, &header, PAYLOAD, now),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let now = 1_700_000_000;
        let header = signature_header(SECRET, now, PAYLOAD);
        assert_eq!(
            verify_signature(SECRET, &header, b"{}", now),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let now = 1_700_000_000;
        let header = signature_header(SECRET, now - SIGNATURE_TOLERANCE_SECS - 1, PAYLOAD);
        assert_eq!(
            verify_signature(SECRET, &header, PAYLOAD, now),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn malformed_header_is_rejected() {
        let now = 1_700_000_000;
        for header in ["", "v1=deadbeef", "t=123", "t=abc,v1=deadbeef"] {
            assert_eq!(
                verify_signature(SECRET, header, PAYLOAD, now),
                Err(SignatureError::Malformed),
                "header: {header}",
            );
        }
    }

    #[test]
    fn rotation_accepts_any_matching_v1() {
        let now = 1_700_000_000;
        let good = signature_header(SECRET, now, PAYLOAD);
        let sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t={now},v1=deadbeef,v1={sig}");
        assert_eq!(verify_signature(SECRET, &header, PAYLOAD, now), Ok(()));
    }
}
