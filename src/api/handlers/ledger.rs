//! Cost and revenue ledger handlers.

use crate::{
    auth::middleware::AuthUser,
    db::turso::parse_date,
    types::{
        AppError, CreateCostRequest, CreateRevenueRequest, DateRangeQuery, LedgerEntry, Result,
    },
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{Months, NaiveDate, Utc};

/// Months covered by a ledger listing without `from`.
const DEFAULT_WINDOW_MONTHS: u32 = 3;

fn required<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| AppError::InvalidInput(format!("'{}' is required", field)))
}

fn required_text(value: Option<String>, field: &str) -> Result<String> {
    let value = required(value, field)?;
    if value.trim().is_empty() {
        return Err(AppError::InvalidInput(format!("'{}' is required", field)));
    }
    Ok(value)
}

fn required_amount(value: Option<f64>) -> Result<f64> {
    match required(value, "amount")? {
        amount if amount == 0.0 => Err(AppError::InvalidInput("'amount' is required".to_string())),
        amount => Ok(amount),
    }
}

/// Inclusive `YYYY-MM-DD` bounds, defaulting to the last three months.
fn date_range(query: &DateRangeQuery, today: NaiveDate) -> Result<(String, String)> {
    let to = match query.to.as_deref() {
        Some(to) => parse_date(to)?,
        None => today,
    };
    let from = match query.from.as_deref() {
        Some(from) => parse_date(from)?,
        None => today
            .checked_sub_months(Months::new(DEFAULT_WINDOW_MONTHS))
            .unwrap_or(today),
    };
    if from > to {
        return Err(AppError::InvalidInput(format!(
            "'from' ({}) is after 'to' ({})",
            from, to
        )));
    }
    Ok((
        from.format("%Y-%m-%d").to_string(),
        to.format("%Y-%m-%d").to_string(),
    ))
}

// ============= Costs =============

/// Record a cost
#[utoipa::path(
    post,
    path = "/api/restaurants/{id}/costs",
    params(("id" = String, Path, description = "Restaurant ID")),
    request_body = CreateCostRequest,
    responses(
        (status = 201, description = "Cost recorded", body = LedgerEntry),
        (status = 400, description = "Missing or invalid field"),
        (status = 404, description = "Restaurant not found")
    ),
    tag = "ledger",
    security(("bearer" = []))
)]
pub async fn create_cost(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<CreateCostRequest>,
) -> Result<(StatusCode, Json<LedgerEntry>)> {
    super::owned_restaurant(&state, &claims, &id).await?;

    let amount = required_amount(payload.amount)?;
    let cost_type = required(payload.cost_type, "cost_type")?;
    let description = required_text(payload.description, "description")?;
    let date = required_text(payload.date, "date")?;

    let entry = state
        .turso
        .insert_cost(&id, amount, cost_type, &description, &date)
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// List costs in a date range
#[utoipa::path(
    get,
    path = "/api/restaurants/{id}/costs",
    params(
        ("id" = String, Path, description = "Restaurant ID"),
        ("from" = Option<String>, Query, description = "First day, YYYY-MM-DD (default: three months ago)"),
        ("to" = Option<String>, Query, description = "Last day, YYYY-MM-DD (default: today)")
    ),
    responses(
        (status = 200, description = "Costs", body = [LedgerEntry]),
        (status = 404, description = "Restaurant not found")
    ),
    tag = "ledger",
    security(("bearer" = []))
)]
pub async fn list_costs(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
    Query(query): Query<DateRangeQuery>,
) -> Result<Json<Vec<LedgerEntry>>> {
    super::owned_restaurant(&state, &claims, &id).await?;
    let (from, to) = date_range(&query, Utc::now().date_naive())?;
    Ok(Json(state.turso.list_costs(&id, &from, &to).await?))
}

// ============= Revenues =============

/// Record a revenue
#[utoipa::path(
    post,
    path = "/api/restaurants/{id}/revenues",
    params(("id" = String, Path, description = "Restaurant ID")),
    request_body = CreateRevenueRequest,
    responses(
        (status = 201, description = "Revenue recorded", body = LedgerEntry),
        (status = 400, description = "Missing or invalid field"),
        (status = 404, description = "Restaurant not found")
    ),
    tag = "ledger",
    security(("bearer" = []))
)]
pub async fn create_revenue(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<CreateRevenueRequest>,
) -> Result<(StatusCode, Json<LedgerEntry>)> {
    super::owned_restaurant(&state, &claims, &id).await?;

    let amount = required_amount(payload.amount)?;
    let description = required_text(payload.description, "description")?;
    let date = required_text(payload.date, "date")?;

    let entry = state
        .turso
        .insert_revenue(&id, amount, &description, &date)
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// List revenues in a date range
#[utoipa::path(
    get,
    path = "/api/restaurants/{id}/revenues",
    params(
        ("id" = String, Path, description = "Restaurant ID"),
        ("from" = Option<String>, Query, description = "First day, YYYY-MM-DD (default: three months ago)"),
        ("to" = Option<String>, Query, description = "Last day, YYYY-MM-DD (default: today)")
    ),
    responses(
        (status = 200, description = "Revenues", body = [LedgerEntry]),
        (status = 404, description = "Restaurant not found")
    ),
    tag = "ledger",
    security(("bearer" = []))
)]
pub async fn list_revenues(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
    Query(query): Query<DateRangeQuery>,
) -> Result<Json<Vec<LedgerEntry>>> {
    super::owned_restaurant(&state, &claims, &id).await?;
    let (from, to) = date_range(&query, Utc::now().date_naive())?;
    Ok(Json(state.turso.list_revenues(&id, &from, &to).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 31).expect("date")
    }

    #[test]
    fn test_default_range_is_three_months() {
        let query = DateRangeQuery { from: None, to: None };
        let (from, to) = date_range(&query, today()).expect("range");
        assert_eq!(from, "2024-02-29");
        assert_eq!(to, "2024-05-31");
    }

    #[test]
    fn test_range_rejects_bad_dates() {
        let reversed = DateRangeQuery {
            from: Some("2024-06-01".into()),
            to: Some("2024-05-01".into()),
        };
        assert!(matches!(
            date_range(&reversed, today()),
            Err(AppError::InvalidInput(_))
        ));

        let malformed = DateRangeQuery {
            from: Some("01/05/2024".into()),
            to: None,
        };
        assert!(date_range(&malformed, today()).is_err());
    }

    #[test]
    fn test_required_fields() {
        assert!(required_amount(None).is_err());
        assert!(required_amount(Some(0.0)).is_err());
        assert_eq!(required_amount(Some(12.5)).expect("amount"), 12.5);
        assert!(required_text(Some("   ".into()), "description").is_err());
        assert_eq!(
            required_text(Some("Aluguel".into()), "description").expect("text"),
            "Aluguel"
        );
    }
}
