use axum::{
    middleware,
    routing::get,
    Router,
};

use crate::cors::cors_headers;
use crate::presence::routes as presence_routes;
use crate::state::AppState;

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    // Visitor counting is public: the landing page calls it without credentials
    let visitor_routes = Router::new().route(
        "/api/visitors",
        get(presence_routes::visitors)
            .post(presence_routes::visitors)
            .delete(presence_routes::visitors),
    );

    // Scheduled cleanup (Bearer cron secret checked in the handler)
    let cleanup_routes = Router::new().route(
        "/api/cleanup",
        get(presence_routes::cleanup).post(presence_routes::cleanup),
    );

    let health = Router::new().route("/health", get(health_check));

    Router::new()
        .merge(visitor_routes)
        .merge(cleanup_routes)
        .merge(health)
        .layer(middleware::from_fn(cors_headers))
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
