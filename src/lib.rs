//! Tailgate - AI request gateway with ordered multi-provider failover
//!
//! A prompt is screened by the security pipeline, then sent down a resolved
//! fallback chain of LLM providers (local and cloud) until one answers.
//! Provider health is probed in the background and kept in a shared cache
//! for operators; it never gates the request path.

pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod health;
pub mod metrics;
pub mod middleware;
pub mod providers;
pub mod routing;
pub mod security;
pub mod telemetry;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post},
};
use tower_http::trace::TraceLayer;

/// HTTP routes over shared state
pub fn app(state: handlers::AppState) -> Router {
    Router::new()
        .route("/chat", post(handlers::chat::handler))
        .route("/health", get(handlers::health::handler))
        .route("/metrics", get(handlers::metrics::handler))
        .route("/admin/providers", get(handlers::admin::providers))
        .route("/admin/providers/check", post(handlers::admin::check_now))
        .route("/admin/providers/health", delete(handlers::admin::clear_health))
        .route("/admin/reload", post(handlers::admin::reload))
        .layer(axum_middleware::from_fn(
            middleware::request_id_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
