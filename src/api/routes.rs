//! Router construction

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::api::handlers;
use crate::middleware::rate_limit::RateLimitLayer;
use crate::AppState;

/// Build the service router
pub fn create_router(state: Arc<AppState>) -> Router {
    let settings = state.settings.clone();

    let mut router = Router::new()
        .route("/generate", post(handlers::generate))
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        .layer(DefaultBodyLimit::max(settings.server.max_upload_bytes));

    if settings.rate_limit.enabled {
        info!(
            requests_per_second = settings.rate_limit.requests_per_second,
            burst_size = settings.rate_limit.burst_size,
            "Rate limiting enabled"
        );
        router = router.layer(RateLimitLayer::new(
            settings.rate_limit.requests_per_second,
            settings.rate_limit.burst_size,
        ));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
