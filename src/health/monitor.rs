//! Background health monitoring
//!
//! Each cycle probes every distinct instance in the current fallback chain
//! concurrently, writes the results to the `HealthCache` and keeps the last
//! `HealthReport` for the `/health` endpoint.

use super::{HealthCache, HealthProber, HealthRecord, HealthStatus, ProbeOutcome};
use crate::metrics::Metrics;
use crate::routing::{ProviderCandidate, RoutingTable, SharedRouting};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Aggregate state of the fallback chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Healthy,
    /// Fewer than half the instances are healthy
    Degraded,
    /// Nothing is healthy
    Critical,
}

impl OverallStatus {
    pub fn from_counts(healthy: usize, total: usize) -> Self {
        if healthy == 0 {
            Self::Critical
        } else if healthy * 2 < total {
            Self::Degraded
        } else {
            Self::Healthy
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Critical => "critical",
        }
    }
}

/// Probe result for one instance in a report
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    /// `provider:instance`
    pub key: String,
    #[serde(flatten)]
    pub record: HealthRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_url: Option<String>,
}

/// Outcome of one probe cycle
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub overall: OverallStatus,
    pub total: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    pub misconfigured: usize,
    pub checked_at: DateTime<Utc>,
    pub providers: Vec<ProviderHealth>,
}

impl HealthReport {
    pub fn from_providers(providers: Vec<ProviderHealth>) -> Self {
        let count = |status: HealthStatus| {
            providers
                .iter()
                .filter(|p| p.record.status == status)
                .count()
        };
        let healthy = count(HealthStatus::Healthy);
        let unhealthy = count(HealthStatus::Unhealthy);
        let misconfigured = count(HealthStatus::Misconfigured);
        let total = providers.len();

        Self {
            overall: OverallStatus::from_counts(healthy, total),
            total,
            healthy,
            unhealthy,
            misconfigured,
            checked_at: Utc::now(),
            providers,
        }
    }
}

/// Periodic prober for the instances in the current routing table
pub struct HealthMonitor {
    routing: Arc<SharedRouting>,
    prober: Arc<HealthProber>,
    cache: Arc<HealthCache>,
    metrics: Arc<Metrics>,
    interval: Duration,
    last_report: RwLock<Option<HealthReport>>,
    /// One lock per health key; held from probe start until the cache write
    probe_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl HealthMonitor {
    pub fn new(
        routing: Arc<SharedRouting>,
        prober: Arc<HealthProber>,
        cache: Arc<HealthCache>,
        metrics: Arc<Metrics>,
        interval: Duration,
    ) -> Self {
        Self {
            routing,
            prober,
            cache,
            metrics,
            interval,
            last_report: RwLock::new(None),
            probe_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Report from the most recent completed cycle
    pub fn last_report(&self) -> Option<HealthReport> {
        match self.last_report.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn probe_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.probe_locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    /// Probe one instance and store the result
    ///
    /// A probe for a key that is already being probed (by the background loop
    /// or a manual check) waits until that result has been written.
    async fn probe_and_store(
        &self,
        candidate: &ProviderCandidate,
        table: &RoutingTable,
    ) -> (ProbeOutcome, HealthRecord) {
        let lock = self.probe_lock(&candidate.health_key());
        let _held = lock.lock().await;

        let outcome = self.prober.probe(candidate, table).await;
        let record = outcome.to_record(candidate);
        self.cache.put(&record).await;
        (outcome, record)
    }

    /// Run one probe cycle over the current chain
    ///
    /// Safe to call while the background loop is mid-cycle: probes of the same
    /// instance never overlap.
    pub async fn run_once(&self) -> HealthReport {
        let table = self.routing.snapshot();

        // One probe per instance even when it appears in several groups
        let mut seen = HashSet::new();
        let targets: Vec<&ProviderCandidate> = table
            .chain()
            .iter()
            .filter(|candidate| seen.insert(candidate.health_key()))
            .collect();

        let outcomes = join_all(
            targets
                .iter()
                .map(|candidate| self.probe_and_store(candidate, &table)),
        )
        .await;

        let mut providers = Vec::with_capacity(targets.len());
        for (candidate, (outcome, record)) in targets.iter().zip(outcomes) {
            self.metrics
                .record_probe(candidate.provider().as_str(), record.status);

            if !outcome.healthy {
                tracing::warn!(
                    provider = %candidate.provider(),
                    model = %candidate.instance_qualified_model(),
                    status = %record.status.as_str(),
                    error_type = %record.error_type.as_str(),
                    error = record.error_message.as_deref().unwrap_or(""),
                    admin_action = record.admin_action.as_deref().unwrap_or(""),
                    "Provider health check failed"
                );
            }

            providers.push(ProviderHealth {
                key: candidate.health_key(),
                record,
                used_url: outcome.used_url,
            });
        }

        let report = HealthReport::from_providers(providers);
        match report.overall {
            OverallStatus::Critical => tracing::error!(
                total = report.total,
                healthy = report.healthy,
                misconfigured = report.misconfigured,
                "Health check cycle complete: no healthy providers"
            ),
            OverallStatus::Degraded => tracing::warn!(
                total = report.total,
                healthy = report.healthy,
                misconfigured = report.misconfigured,
                "Health check cycle complete: degraded"
            ),
            OverallStatus::Healthy => tracing::info!(
                total = report.total,
                healthy = report.healthy,
                "Health check cycle complete"
            ),
        }

        match self.last_report.write() {
            Ok(mut guard) => *guard = Some(report.clone()),
            Err(poisoned) => *poisoned.into_inner() = Some(report.clone()),
        }
        report
    }

    /// Start periodic checks
    ///
    /// The first cycle runs immediately. Each cycle runs in its own task so a
    /// panicking probe is logged and counted instead of ending monitoring.
    pub fn spawn(self: Arc<Self>) -> MonitorHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            tracing::info!(
                interval_seconds = self.interval.as_secs(),
                "Starting background health monitor"
            );

            loop {
                let cycle = tokio::spawn({
                    let monitor = Arc::clone(&self);
                    async move { monitor.run_once().await }
                });
                let abort = cycle.abort_handle();

                tokio::select! {
                    result = cycle => {
                        if let Err(e) = result
                            && e.is_panic()
                        {
                            self.metrics.background_task_failure("probe_cycle_panic");
                            tracing::error!(
                                error = ?e,
                                "Health check cycle panicked. Continuing with next cycle."
                            );
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        abort.abort();
                        break;
                    }
                }

                tokio::select! {
                    _ = tokio::time::sleep(self.interval) => {}
                    _ = shutdown_rx.changed() => break,
                }
            }

            tracing::info!("Background health monitor stopped");
        });

        MonitorHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

/// Running monitor; dropping the handle also ends the loop
#[derive(Debug)]
pub struct MonitorHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal shutdown and wait for the loop to exit
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        match self.task.await {
            Ok(()) => {}
            Err(e) if e.is_panic() => {
                tracing::error!(error = ?e, "Background health monitor panicked");
            }
            Err(e) => {
                tracing::error!(error = ?e, "Background health monitor terminated unexpectedly");
            }
        }
    }
}
