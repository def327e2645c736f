//! Health check endpoint
//!
//! Liveness for load balancers plus a one-line view of provider health.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::handlers::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: &'static str,
    /// Resolved fallback chain length
    pub chain_len: usize,
    /// Overall provider status from the last monitor cycle, or "unknown"
    pub providers: &'static str,
    /// "degraded" when the shared health store is unreachable
    pub health_store: &'static str,
}

/// Health check handler
///
/// Always 200 while the process serves requests; provider trouble is
/// reported in the body, not the status code.
pub async fn handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let providers = state
        .monitor()
        .last_report()
        .map(|report| report.overall.as_str())
        .unwrap_or("unknown");
    let health_store = if state.cache().is_degraded() {
        "degraded"
    } else {
        "operational"
    };

    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "OK",
            chain_len: state.gateway().chain_len(),
            providers,
            health_store,
        }),
    )
}
