//! Restaurant handlers.
//!
//! Every restaurant belongs to the authenticated tenant; other tenants'
//! restaurants answer 404.

use crate::{
    auth::middleware::AuthUser,
    types::{CreateRestaurantRequest, Restaurant, Result, UpdateRestaurantRequest},
    AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

/// Create a restaurant
#[utoipa::path(
    post,
    path = "/api/restaurants",
    request_body = CreateRestaurantRequest,
    responses(
        (status = 201, description = "Restaurant created", body = Restaurant),
        (status = 400, description = "Blank name or CNPJ, or duplicate CNPJ"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "restaurants",
    security(("bearer" = []))
)]
pub async fn create_restaurant(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Json(payload): Json<CreateRestaurantRequest>,
) -> Result<(StatusCode, Json<Restaurant>)> {
    let restaurant = state.turso.create_restaurant(&claims.sub, &payload).await?;
    tracing::info!(restaurant_id = %restaurant.id, user_id = %claims.sub, "restaurant created");
    Ok((StatusCode::CREATED, Json(restaurant)))
}

/// List the caller's restaurants
#[utoipa::path(
    get,
    path = "/api/restaurants",
    responses(
        (status = 200, description = "Restaurants", body = [Restaurant]),
        (status = 401, description = "Unauthorized")
    ),
    tag = "restaurants",
    security(("bearer" = []))
)]
pub async fn list_restaurants(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<Vec<Restaurant>>> {
    Ok(Json(state.turso.list_restaurants(&claims.sub).await?))
}

/// Get one restaurant
#[utoipa::path(
    get,
    path = "/api/restaurants/{id}",
    params(("id" = String, Path, description = "Restaurant ID")),
    responses(
        (status = 200, description = "Restaurant", body = Restaurant),
        (status = 404, description = "Not found")
    ),
    tag = "restaurants",
    security(("bearer" = []))
)]
pub async fn get_restaurant(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Restaurant>> {
    Ok(Json(super::owned_restaurant(&state, &claims, &id).await?))
}

/// Update a restaurant's name, CNPJ, address and phone
#[utoipa::path(
    patch,
    path = "/api/restaurants/{id}",
    params(("id" = String, Path, description = "Restaurant ID")),
    request_body = UpdateRestaurantRequest,
    responses(
        (status = 200, description = "Restaurant updated", body = Restaurant),
        (status = 400, description = "Blank name or CNPJ, or CNPJ used by another restaurant"),
        (status = 404, description = "Not found")
    ),
    tag = "restaurants",
    security(("bearer" = []))
)]
pub async fn update_restaurant(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateRestaurantRequest>,
) -> Result<Json<Restaurant>> {
    let restaurant = state
        .turso
        .update_restaurant(&claims.sub, &id, &payload)
        .await?;
    tracing::info!(restaurant_id = %restaurant.id, user_id = %claims.sub, "restaurant updated");
    Ok(Json(restaurant))
}

/// Delete a restaurant with its files, index entries and warehouse rows
#[utoipa::path(
    delete,
    path = "/api/restaurants/{id}",
    params(("id" = String, Path, description = "Restaurant ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found")
    ),
    tag = "restaurants",
    security(("bearer" = []))
)]
pub async fn delete_restaurant(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let shared_tables = state.dashboard_tables().all();
    state
        .ingest_service()
        .await?
        .delete_restaurant(&claims.sub, &id, &shared_tables)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
