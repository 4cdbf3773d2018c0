//! Router configuration.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{balance, health, spend, webhooks};
use crate::state::AppState;

/// Maximum concurrent requests for spend/refund RPCs. These sit on the
/// generation hot path and get their own headroom.
const SPEND_MAX_CONCURRENT_REQUESTS: usize = 100;

/// Maximum concurrent requests for read endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## RPCs (service API key auth)
/// - `POST /v1/spend` - Reserve tokens for a generation job
/// - `POST /v1/refund` - Refund a failed generation job
/// - `GET /v1/balance/:customer_id` - Current balance
/// - `GET /v1/ledger/:customer_id` - Ledger history, newest first
/// - `GET /v1/subscription/:customer_id` - Projected subscription state
///
/// ## Webhooks (signature verification, no rate limit)
/// - `POST /webhooks/stripe` - Stripe webhooks
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config.cors_origins);
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let state = Arc::new(state);

    let spend_routes = Router::new()
        .route("/spend", post(spend::spend))
        .route("/refund", post(spend::refund))
        .layer(ConcurrencyLimitLayer::new(SPEND_MAX_CONCURRENT_REQUESTS));

    let read_routes = Router::new()
        .route("/balance/:customer_id", get(balance::get_balance))
        .route("/ledger/:customer_id", get(balance::list_ledger))
        .route("/subscription/:customer_id", get(balance::get_subscription))
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS));

    Router::new()
        // Health (public)
        .route("/health", get(health::health))
        // API v1 routes
        .nest("/v1", spend_routes.merge(read_routes))
        // Webhooks (no rate limit - delivery volume is the provider's)
        .route("/webhooks/stripe", post(webhooks::stripe_webhook))
        // Global middleware
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
