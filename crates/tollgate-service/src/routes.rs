//! Router configuration.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post, put};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{budget, health, reports, subscriptions, usage};
use crate::state::AppState;

/// Maximum concurrent requests for usage endpoints.
const USAGE_MAX_CONCURRENT_REQUESTS: usize = 100;

/// Maximum concurrent requests for general API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Liveness
///
/// ## Usage (collector API key for writes)
/// - `POST /v1/usage` - Record one billable call
/// - `POST /v1/usage/batch` - Record many billable calls
/// - `GET /v1/usage/monthly` - Calendar month rollup
/// - `GET /v1/usage/breakdown` - Time-bucketed cost series
/// - `GET /v1/usage/export` - JSON or CSV download
///
/// ## Monitoring
/// - `GET /v1/providers/health` - Per-provider health
/// - `GET /v1/optimization/suggestions` - Ranked savings suggestions
///
/// ## Budget and subscriptions (admin key for writes)
/// - `GET /v1/budget`, `PUT /v1/budget`
/// - `GET /v1/subscriptions`, `PUT /v1/subscriptions/:provider`
pub fn create_router(state: AppState) -> Router {
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    // Collectors report after every third-party call, so usage gets the
    // larger concurrency allowance.
    let usage_routes = Router::new()
        .route("/", post(usage::report_usage))
        .route("/batch", post(usage::report_usage_batch))
        .route("/monthly", get(reports::monthly_usage))
        .route("/breakdown", get(reports::cost_breakdown))
        .route("/export", get(reports::export_usage))
        .layer(ConcurrencyLimitLayer::new(USAGE_MAX_CONCURRENT_REQUESTS));

    let api_routes = Router::new()
        .route("/providers/health", get(reports::provider_health))
        .route(
            "/optimization/suggestions",
            get(reports::optimization_suggestions),
        )
        .route("/budget", get(budget::get_budget).put(budget::set_budget))
        .route("/subscriptions", get(subscriptions::list_subscriptions))
        .route(
            "/subscriptions/:provider",
            put(subscriptions::upsert_subscription),
        )
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS))
        .nest("/usage", usage_routes);

    Router::new()
        .route("/health", get(health::health))
        .nest("/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
