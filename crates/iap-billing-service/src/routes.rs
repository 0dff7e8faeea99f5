//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{admin, health, queue, receipts, webhooks};
use crate::state::AppState;

// ============================================================================
// Concurrency Limiting Constants
// ============================================================================

/// Maximum concurrent requests for purchase endpoints (enqueue, verify).
const PURCHASE_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Maximum concurrent queue runs triggered over HTTP.
const QUEUE_RUN_MAX_CONCURRENT_REQUESTS: usize = 2;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
/// - `POST /enqueue` - Queue a purchase for verification
/// - `POST /verify-receipt` - Verify a receipt immediately
///
/// ## Cron (shared secret)
/// - `GET|POST /process-queue` - Run the queue processor once
///
/// ## Webhooks (Apple shared secret)
/// - `POST /webhooks/apple` - App Store server notifications
///
/// ## Admin (`X-Admin-Key`)
/// - `GET /admin/queue` - List queue jobs
/// - `POST /admin/queue/:transaction_id/retry` - Requeue a failed job
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let purchase_routes = Router::new()
        .route("/enqueue", post(queue::enqueue))
        .route("/verify-receipt", post(receipts::verify_receipt))
        .layer(ConcurrencyLimitLayer::new(PURCHASE_MAX_CONCURRENT_REQUESTS));

    let queue_routes = Router::new()
        .route(
            "/process-queue",
            get(queue::process_queue).post(queue::process_queue),
        )
        .layer(ConcurrencyLimitLayer::new(QUEUE_RUN_MAX_CONCURRENT_REQUESTS));

    let admin_routes = Router::new()
        .route("/queue", get(admin::list_jobs))
        .route("/queue/:transaction_id/retry", post(admin::retry_job));

    Router::new()
        // Health (public, no rate limit)
        .route("/health", get(health::health))
        .merge(purchase_routes)
        .merge(queue_routes)
        .nest("/admin", admin_routes)
        // Webhooks (no rate limit - controlled by Apple)
        .route("/webhooks/apple", post(webhooks::apple_webhook))
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
