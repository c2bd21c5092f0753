use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    db::models::Role,
    error::{AppError, Result},
    middleware::auth::AuthUser,
    util::dates::{month_key, month_range, parse_ts},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/summary", get(summary))
        .route("/revenue", get(revenue))
        .route("/maintenance", get(maintenance_stats))
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub properties: i64,
    pub units: i64,
    pub occupied_units: i64,
    pub occupancy_rate: f64,
    pub open_maintenance: i64,
    pub collected_cents: i64,
    pub outstanding_cents: i64,
}

#[derive(Debug, Deserialize)]
pub struct RevenueQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RevenueBucket {
    pub month: String,
    pub amount_cents: i64,
}

#[derive(Debug, Serialize)]
pub struct MaintenanceStats {
    pub open: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub avg_resolution_hours: Option<f64>,
}

/// Landlord scoping filter: admins see everything, landlords their own
/// books. Tenants have no analytics surface.
fn require_analytics_role(user: &AuthUser) -> Result<Option<&str>> {
    match user.role {
        Role::Admin => Ok(None),
        Role::Landlord => Ok(Some(user.id.as_str())),
        Role::Tenant => Err(AppError::Forbidden(
            "Analytics are available to landlords only".to_string(),
        )),
    }
}

async fn summary(State(state): State<AppState>, user: AuthUser) -> Result<Json<SummaryResponse>> {
    let landlord = require_analytics_role(&user)?;

    // Each aggregate takes the same optional landlord filter; NULL disables it.
    let properties = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM properties WHERE (? IS NULL OR landlord_id = ?)",
    )
    .bind(landlord)
    .bind(landlord)
    .fetch_one(&state.db.pool)
    .await?;

    let units = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM units u JOIN properties p ON u.property_id = p.id
         WHERE (? IS NULL OR p.landlord_id = ?)",
    )
    .bind(landlord)
    .bind(landlord)
    .fetch_one(&state.db.pool)
    .await?;

    let occupied_units = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM units u JOIN properties p ON u.property_id = p.id
         WHERE u.status = 'occupied' AND (? IS NULL OR p.landlord_id = ?)",
    )
    .bind(landlord)
    .bind(landlord)
    .fetch_one(&state.db.pool)
    .await?;

    let open_maintenance = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM maintenance_requests m JOIN properties p ON m.property_id = p.id
         WHERE m.status != 'completed' AND (? IS NULL OR p.landlord_id = ?)",
    )
    .bind(landlord)
    .bind(landlord)
    .fetch_one(&state.db.pool)
    .await?;

    let collected_cents = sqlx::query_scalar::<_, i64>(
        "SELECT COALESCE(SUM(amount_cents), 0) FROM payments
         WHERE status = 'paid' AND (? IS NULL OR landlord_id = ?)",
    )
    .bind(landlord)
    .bind(landlord)
    .fetch_one(&state.db.pool)
    .await?;

    let outstanding_cents = sqlx::query_scalar::<_, i64>(
        "SELECT COALESCE(SUM(amount_cents), 0) FROM invoices
         WHERE status != 'paid' AND (? IS NULL OR landlord_id = ?)",
    )
    .bind(landlord)
    .bind(landlord)
    .fetch_one(&state.db.pool)
    .await?;

    let occupancy_rate = if units > 0 {
        occupied_units as f64 / units as f64
    } else {
        0.0
    };

    Ok(Json(SummaryResponse {
        properties,
        units,
        occupied_units,
        occupancy_rate,
        open_maintenance,
        collected_cents,
        outstanding_cents,
    }))
}

async fn revenue(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<RevenueQuery>,
) -> Result<Json<Vec<RevenueBucket>>> {
    let landlord = require_analytics_role(&user)?;

    let to = match &query.to {
        Some(s) => parse_date(s)?,
        None => Utc::now().date_naive(),
    };
    let from = match &query.from {
        Some(s) => parse_date(s)?,
        None => to
            .checked_sub_months(chrono::Months::new(11))
            .unwrap_or(to)
            .with_day(1)
            .unwrap_or(to),
    };
    if from > to {
        return Err(AppError::Validation(
            "'from' must not be after 'to'".to_string(),
        ));
    }

    let rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT completed_at, amount_cents FROM payments
         WHERE status = 'paid' AND completed_at IS NOT NULL
           AND (? IS NULL OR landlord_id = ?)",
    )
    .bind(landlord)
    .bind(landlord)
    .fetch_all(&state.db.pool)
    .await?;

    // Bucket by month in the application; timestamps are RFC 3339 text.
    let mut totals: HashMap<String, i64> = HashMap::new();
    for (completed_at, amount) in rows {
        let Some(ts) = parse_ts(&completed_at) else {
            continue;
        };
        let day = ts.date_naive();
        if day < from || day > to {
            continue;
        }
        *totals.entry(month_key(&ts)).or_insert(0) += amount;
    }

    let buckets = month_range(from, to)
        .into_iter()
        .map(|month| {
            let amount_cents = totals.get(&month).copied().unwrap_or(0);
            RevenueBucket { month, amount_cents }
        })
        .collect();

    Ok(Json(buckets))
}

async fn maintenance_stats(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<MaintenanceStats>> {
    let landlord = require_analytics_role(&user)?;

    let counts = sqlx::query_as::<_, (String, i64)>(
        "SELECT m.status, COUNT(*) FROM maintenance_requests m
         JOIN properties p ON m.property_id = p.id
         WHERE (? IS NULL OR p.landlord_id = ?)
         GROUP BY m.status",
    )
    .bind(landlord)
    .bind(landlord)
    .fetch_all(&state.db.pool)
    .await?;

    let mut stats = MaintenanceStats {
        open: 0,
        in_progress: 0,
        completed: 0,
        avg_resolution_hours: None,
    };
    for (status, count) in counts {
        match status.as_str() {
            "open" => stats.open = count,
            "in_progress" => stats.in_progress = count,
            "completed" => stats.completed = count,
            _ => {}
        }
    }

    let resolved = sqlx::query_as::<_, (String, String)>(
        "SELECT m.created_at, m.completed_at FROM maintenance_requests m
         JOIN properties p ON m.property_id = p.id
         WHERE m.status = 'completed' AND m.completed_at IS NOT NULL
           AND (? IS NULL OR p.landlord_id = ?)",
    )
    .bind(landlord)
    .bind(landlord)
    .fetch_all(&state.db.pool)
    .await?;

    let durations: Vec<f64> = resolved
        .iter()
        .filter_map(|(created, completed)| {
            let created = parse_ts(created)?;
            let completed = parse_ts(completed)?;
            Some((completed - created).num_seconds() as f64 / 3600.0)
        })
        .collect();

    if !durations.is_empty() {
        stats.avg_resolution_hours =
            Some(durations.iter().sum::<f64>() / durations.len() as f64);
    }

    Ok(Json(stats))
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| AppError::Validation("Dates must be YYYY-MM-DD".to_string()))
}
