//! HTTP API Handlers and Routes
//!
//! The REST API layer of FoodAtlas, built on the Axum web framework.
//!
//! # Module Structure
//!
//! - [`api::handlers`](crate::api::handlers) - Request handlers for each endpoint
//! - [`api::routes`](crate::api::routes) - Route definitions and router configuration
//!
//! # API Endpoints
//!
//! ## Restaurants (`/api/restaurants`)
//! - `POST /api/restaurants` - Create a restaurant
//! - `GET /api/restaurants` - List own restaurants
//! - `GET /api/restaurants/{id}` - Get a restaurant
//! - `DELETE /api/restaurants/{id}` - Delete a restaurant and its data
//!
//! ## Files (`/api/restaurants/{id}/files`)
//! - `POST` - Upload a `.txt`, `.md`, `.pdf` or `.csv` file (multipart `file`)
//! - `GET` - List files, newest first
//! - `DELETE /{file_id}` - Delete a file
//!
//! ## Ledger
//! - `POST`/`GET /api/restaurants/{id}/costs`
//! - `POST`/`GET /api/restaurants/{id}/revenues`
//!
//! ## Analytics
//! - `GET /api/restaurants/{id}/break-even`
//! - `GET /api/restaurants/{id}/break-even/monthly`
//! - `GET /api/restaurants/{id}/analytics/avg-ticket`
//! - `GET /api/restaurants/{id}/analytics/count-clients`
//!
//! ## Chat
//! - `POST /api/restaurants/{id}/chat` - Server-sent event stream
//!
//! ## Health (`/api/health`)
//! - `GET /api/health` - Health check endpoint
//!
//! # Authentication
//!
//! Every endpoint except health and the OpenAPI document requires a JWT in
//! the `Authorization` header:
//! ```text
//! Authorization: Bearer <token>
//! ```
//!
//! # OpenAPI Documentation
//!
//! The document is served at `/api/openapi.json`. With the `swagger-ui`
//! feature, interactive documentation is available at `/swagger-ui/`.

/// Request and response handlers for all API endpoints.
pub mod handlers;
/// Router configuration and route definitions.
pub mod routes;
