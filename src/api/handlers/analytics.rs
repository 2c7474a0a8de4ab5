//! Dashboard analytics handlers.

use crate::{
    analytics::{break_even, dashboard},
    auth::middleware::AuthUser,
    types::{
        AvgTicketResponse, BreakEvenResponse, ClientCountResponse, MonthlyBreakEven,
        MonthlyBreakEvenQuery, Result,
    },
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;

/// Break-even of the current and last month from the ledger
#[utoipa::path(
    get,
    path = "/api/restaurants/{id}/break-even",
    params(("id" = String, Path, description = "Restaurant ID")),
    responses(
        (status = 200, description = "Break-even figures", body = BreakEvenResponse),
        (status = 404, description = "Restaurant not found")
    ),
    tag = "analytics",
    security(("bearer" = []))
)]
pub async fn ledger_break_even(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<BreakEvenResponse>> {
    super::owned_restaurant(&state, &claims, &id).await?;
    let response =
        break_even::ledger_break_even(&state.turso, &id, Utc::now().date_naive()).await?;
    Ok(Json(response))
}

/// Per-month break-even from the dashboard tables
#[utoipa::path(
    get,
    path = "/api/restaurants/{id}/break-even/monthly",
    params(
        ("id" = String, Path, description = "Restaurant ID"),
        ("months" = Option<usize>, Query, description = "Number of months, newest first (default 12)")
    ),
    responses(
        (status = 200, description = "Monthly break-even", body = [MonthlyBreakEven]),
        (status = 404, description = "Restaurant not found"),
        (status = 502, description = "Warehouse error")
    ),
    tag = "analytics",
    security(("bearer" = []))
)]
pub async fn monthly_break_even(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
    Query(query): Query<MonthlyBreakEvenQuery>,
) -> Result<Json<Vec<MonthlyBreakEven>>> {
    super::owned_restaurant(&state, &claims, &id).await?;
    let months = query
        .months
        .filter(|m| *m > 0)
        .unwrap_or(break_even::DEFAULT_MONTHS);
    let result = break_even::monthly_break_even(
        state.warehouse.as_ref(),
        &state.dashboard_tables(),
        &id,
        months,
    )
    .await?;
    Ok(Json(result))
}

/// Average ticket of this month compared to the last
#[utoipa::path(
    get,
    path = "/api/restaurants/{id}/analytics/avg-ticket",
    params(("id" = String, Path, description = "Restaurant ID")),
    responses(
        (status = 200, description = "Average ticket", body = AvgTicketResponse),
        (status = 404, description = "Restaurant not found"),
        (status = 502, description = "Warehouse error")
    ),
    tag = "analytics",
    security(("bearer" = []))
)]
pub async fn avg_ticket(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<AvgTicketResponse>> {
    super::owned_restaurant(&state, &claims, &id).await?;
    let today = Utc::now().date_naive();
    let transactions = dashboard::recent_transactions(
        state.warehouse.as_ref(),
        &state.dashboard_tables(),
        &id,
        today,
    )
    .await?;
    Ok(Json(dashboard::avg_ticket(&transactions, today)))
}

/// Client count of this month compared to the last
#[utoipa::path(
    get,
    path = "/api/restaurants/{id}/analytics/count-clients",
    params(("id" = String, Path, description = "Restaurant ID")),
    responses(
        (status = 200, description = "Client count", body = ClientCountResponse),
        (status = 404, description = "Restaurant not found"),
        (status = 502, description = "Warehouse error")
    ),
    tag = "analytics",
    security(("bearer" = []))
)]
pub async fn count_clients(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ClientCountResponse>> {
    super::owned_restaurant(&state, &claims, &id).await?;
    let today = Utc::now().date_naive();
    let transactions = dashboard::recent_transactions(
        state.warehouse.as_ref(),
        &state.dashboard_tables(),
        &id,
        today,
    )
    .await?;
    Ok(Json(dashboard::count_clients(&transactions, today)))
}
