//! Operator endpoints: provider health, on-demand probing, reload

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::gateway::ReloadSummary;
use crate::handlers::AppState;
use crate::health::{HealthRecord, HealthReport, OverallStatus};
use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Counts from the last monitor cycle
#[derive(Debug, Serialize)]
pub struct ReportSummary {
    pub overall: OverallStatus,
    pub total: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    pub misconfigured: usize,
    pub checked_at: DateTime<Utc>,
}

impl From<&HealthReport> for ReportSummary {
    fn from(report: &HealthReport) -> Self {
        Self {
            overall: report.overall,
            total: report.total,
            healthy: report.healthy,
            unhealthy: report.unhealthy,
            misconfigured: report.misconfigured,
            checked_at: report.checked_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProvidersResponse {
    /// Live cache records keyed by `provider:instance`
    pub providers: BTreeMap<String, HealthRecord>,
    pub last_check: Option<ReportSummary>,
    pub health_store_degraded: bool,
}

/// GET /admin/providers
pub async fn providers(State(state): State<AppState>) -> Json<ProvidersResponse> {
    let providers = state.cache().all_health().await;
    let last_check = state.monitor().last_report().as_ref().map(ReportSummary::from);

    Json(ProvidersResponse {
        providers,
        last_check,
        health_store_degraded: state.cache().is_degraded(),
    })
}

/// POST /admin/providers/check
///
/// Runs one probe cycle inline. An instance the background loop is probing
/// right now is probed again only after that result has been stored.
pub async fn check_now(State(state): State<AppState>) -> Json<HealthReport> {
    tracing::info!("Manual provider health check requested");
    Json(state.monitor().run_once().await)
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub cleared: usize,
}

/// DELETE /admin/providers/health
pub async fn clear_health(State(state): State<AppState>) -> Json<ClearResponse> {
    let cleared = state.cache().clear().await;
    Json(ClearResponse { cleared })
}

/// POST /admin/reload
///
/// Re-reads the config file the server started with. A file that fails to
/// load leaves the running configuration untouched.
pub async fn reload(State(state): State<AppState>) -> AppResult<Json<ReloadSummary>> {
    let path = state
        .config_path()
        .ok_or_else(|| AppError::Config("server was not started from a config file".to_string()))?
        .clone();

    let config = tokio::task::spawn_blocking(move || Config::from_file(&path))
        .await
        .map_err(|e| AppError::Internal(format!("config reload task failed: {}", e)))?
        .inspect_err(|e| {
            tracing::error!(error = %e, "Config reload rejected, keeping current configuration");
        })?;

    Ok(Json(state.gateway().reload(&config)))
}
