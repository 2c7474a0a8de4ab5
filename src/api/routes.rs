use crate::api::handlers::{analytics, chat, files, health, ledger, restaurants};
use crate::auth::middleware::auth_middleware;
use crate::types;
use crate::AppState;
use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware,
    routing::{delete, get, post},
    Json, Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

/// OpenAPI document of the HTTP surface.
#[derive(OpenApi)]
#[openapi(
    info(title = "FoodAtlas API", description = "Restaurant analytics and data chat"),
    paths(
        health::health,
        restaurants::create_restaurant,
        restaurants::list_restaurants,
        restaurants::get_restaurant,
        restaurants::update_restaurant,
        restaurants::delete_restaurant,
        files::upload_file,
        files::list_files,
        files::delete_file,
        ledger::create_cost,
        ledger::list_costs,
        ledger::create_revenue,
        ledger::list_revenues,
        analytics::ledger_break_even,
        analytics::monthly_break_even,
        analytics::avg_ticket,
        analytics::count_clients,
        chat::chat,
    ),
    components(schemas(
        types::Restaurant,
        types::CreateRestaurantRequest,
        types::UpdateRestaurantRequest,
        types::RestaurantFile,
        types::FileKind,
        types::LedgerEntry,
        types::LedgerKind,
        types::CostType,
        types::CreateCostRequest,
        types::CreateRevenueRequest,
        types::BreakEvenFigures,
        types::BreakEvenResponse,
        types::MonthlyBreakEven,
        types::AvgTicketResponse,
        types::ClientCountResponse,
        types::ChatRequest,
        types::Intent,
        types::HealthResponse,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "health"),
        (name = "restaurants"),
        (name = "files"),
        (name = "ledger"),
        (name = "analytics"),
        (name = "chat"),
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(parsed)
}

/// Routes under `/api`, before state and layers are applied.
pub fn api_routes(state: &AppState) -> Router<AppState> {
    let public_routes = Router::new()
        .route("/health", get(health::health))
        .route("/openapi.json", get(openapi_json));

    let protected_routes = Router::new()
        // Restaurants
        .route(
            "/restaurants",
            get(restaurants::list_restaurants).post(restaurants::create_restaurant),
        )
        .route(
            "/restaurants/{id}",
            get(restaurants::get_restaurant)
                .patch(restaurants::update_restaurant)
                .delete(restaurants::delete_restaurant),
        )
        // Files
        .route(
            "/restaurants/{id}/files",
            get(files::list_files).post(files::upload_file),
        )
        .route(
            "/restaurants/{id}/files/{file_id}",
            delete(files::delete_file),
        )
        // Ledger
        .route(
            "/restaurants/{id}/costs",
            get(ledger::list_costs).post(ledger::create_cost),
        )
        .route(
            "/restaurants/{id}/revenues",
            get(ledger::list_revenues).post(ledger::create_revenue),
        )
        // Analytics
        .route(
            "/restaurants/{id}/break-even",
            get(analytics::ledger_break_even),
        )
        .route(
            "/restaurants/{id}/break-even/monthly",
            get(analytics::monthly_break_even),
        )
        .route(
            "/restaurants/{id}/analytics/avg-ticket",
            get(analytics::avg_ticket),
        )
        .route(
            "/restaurants/{id}/analytics/count-clients",
            get(analytics::count_clients),
        )
        // Chat
        .route("/restaurants/{id}/chat", post(chat::chat))
        .route_layer(middleware::from_fn_with_state(
            state.auth_service.clone(),
            auth_middleware,
        ));

    public_routes.merge(protected_routes)
}

/// The full application router with state and layers applied.
pub fn create_router(state: AppState) -> Router {
    let server = state.config_manager.config().server.clone();

    let router = Router::new().nest("/api", api_routes(&state));

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    router
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(server.max_upload_bytes))
        .layer(CompressionLayer::new())
        .layer(cors_layer(&server.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
