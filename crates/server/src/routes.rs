//! Route configuration.

use crate::auth::request_id_middleware;
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/v1/health", get(handlers::health_check))
        .route("/v1/variants", get(handlers::list_variants))
        .route("/system-info", get(handlers::system_info));

    let config_routes = Router::new()
        .route("/generate", post(handlers::generate))
        .route("/preview", post(handlers::preview))
        .route("/download", post(handlers::download));

    let build_routes = Router::new()
        .route("/build-firmware", post(handlers::build_firmware))
        .route(
            "/download-firmware/{build_id}",
            get(handlers::download_firmware),
        );

    let admin_routes = Router::new()
        .route("/cleanup", post(handlers::cleanup))
        .route("/update-firmware", post(handlers::update_firmware));

    let mut router = Router::new()
        .merge(api_routes)
        .merge(config_routes)
        .merge(build_routes)
        .merge(admin_routes);

    // Keep /metrics off public networks; it is unauthenticated.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .layer(DefaultBodyLimit::max(state.config.server.max_upload_bytes))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
