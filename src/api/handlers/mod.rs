//! API request handlers.
//!
//! This module contains all HTTP request handlers organized by functionality.

/// Break-even and dashboard widgets.
pub mod analytics;
/// Streaming chat.
pub mod chat;
/// File upload and management.
pub mod files;
/// Health check.
pub mod health;
/// Cost and revenue ledger.
pub mod ledger;
/// Restaurant CRUD.
pub mod restaurants;

use crate::{
    types::{Claims, Restaurant, Result},
    AppState,
};

/// Load a restaurant owned by the caller, 404 otherwise.
pub(crate) async fn owned_restaurant(
    state: &AppState,
    claims: &Claims,
    restaurant_id: &str,
) -> Result<Restaurant> {
    state.turso.get_restaurant(&claims.sub, restaurant_id).await
}
