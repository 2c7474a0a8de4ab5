//! JWT Authentication and Middleware
//!
//! FoodAtlas does not own user accounts. Tokens are minted by the identity
//! provider in front of the server (or by `foodatlas-server token` during
//! development) and only verified here.
//!
//! # Module Structure
//!
//! - [`auth::jwt`](crate::auth::jwt) - HS256 token signing and verification
//! - [`auth::middleware`](crate::auth::middleware) - Axum middleware and the `AuthUser` extractor
//!
//! # Extracting Claims in Handlers
//!
//! ```ignore
//! async fn protected_handler(AuthUser(claims): AuthUser) -> impl IntoResponse {
//!     format!("Hello, {}!", claims.sub)
//! }
//! ```
//!
//! The claim `sub` is the tenant id that owns restaurants.

/// JWT token generation and validation.
pub mod jwt;
/// Authentication middleware and extractors for protected routes.
pub mod middleware;
