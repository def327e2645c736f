//! Prometheus metrics collection for Tailgate
//!
//! This module provides metrics instrumentation for tracking:
//! - Request outcomes (served, blocked, exhausted, no providers)
//! - Per-provider attempts and their results
//! - How deep into the fallback chain requests are served
//! - Background health probe results
//!
//! Metrics are exposed via the `/metrics` endpoint in Prometheus text format.

use crate::health::HealthStatus;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Terminal outcome of one gateway request
///
/// Type-safe label values keep the outcome cardinality at four.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Served,
    Blocked,
    Exhausted,
    NoProviders,
}

impl RequestOutcome {
    /// Convert outcome to Prometheus label string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Served => "served",
            Self::Blocked => "blocked",
            Self::Exhausted => "exhausted",
            Self::NoProviders => "no_providers",
        }
    }
}

/// Metrics collector for Tailgate
#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,
    requests_total: IntCounterVec,
    provider_attempts: IntCounterVec,
    fallback_depth: HistogramVec,
    health_probes: IntCounterVec,
    background_task_failures: IntCounterVec,
}

impl Metrics {
    /// Create a new Metrics instance
    ///
    /// Registers all metrics with a new Prometheus registry.
    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails (e.g., duplicate names).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new(
                "tailgate_requests_total",
                "Total number of gateway requests by outcome",
            ),
            &["outcome"],
        )?;

        // Provider names come from configuration and result labels from
        // ProviderError::kind, so cardinality is bounded.
        let provider_attempts = IntCounterVec::new(
            Opts::new(
                "tailgate_provider_attempts_total",
                "Provider adapter invocations by provider and result",
            ),
            &["provider", "result"],
        )?;

        let fallback_depth = HistogramVec::new(
            HistogramOpts::new(
                "tailgate_fallback_depth",
                "Zero-based chain position of the candidate that served the request",
            )
            .buckets(vec![0.0, 1.0, 2.0, 3.0, 5.0, 8.0]),
            &["provider"],
        )?;

        let health_probes = IntCounterVec::new(
            Opts::new(
                "tailgate_health_probes_total",
                "Background health probes by provider and resulting status",
            ),
            &["provider", "status"],
        )?;

        let background_task_failures = IntCounterVec::new(
            Opts::new(
                "tailgate_background_task_failures_total",
                "Background health monitor failures by type",
            ),
            &["failure_type"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(provider_attempts.clone()))?;
        registry.register(Box::new(fallback_depth.clone()))?;
        registry.register(Box::new(health_probes.clone()))?;
        registry.register(Box::new(background_task_failures.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            requests_total,
            provider_attempts,
            fallback_depth,
            health_probes,
            background_task_failures,
        })
    }

    /// Record the outcome of a gateway request
    pub fn record_request(&self, outcome: RequestOutcome) {
        self.requests_total
            .with_label_values(&[outcome.as_str()])
            .inc();
    }

    /// Record one adapter invocation
    ///
    /// `result` is `"success"` or a `ProviderError::kind` label.
    pub fn record_attempt(&self, provider: &str, result: &str) {
        self.provider_attempts
            .with_label_values(&[provider, result])
            .inc();
    }

    /// Record the chain position that served a request
    pub fn record_fallback_depth(&self, provider: &str, position: usize) {
        self.fallback_depth
            .with_label_values(&[provider])
            .observe(position as f64);
    }

    /// Record a background probe result
    pub fn record_probe(&self, provider: &str, status: HealthStatus) {
        self.health_probes
            .with_label_values(&[provider, status.as_str()])
            .inc();
    }

    /// Record a background monitor failure (e.g. a panicked probe cycle)
    pub fn background_task_failure(&self, failure_type: &str) {
        self.background_task_failures
            .with_label_values(&[failure_type])
            .inc();
    }

    /// Total requests recorded with an outcome
    pub fn requests_count(&self, outcome: RequestOutcome) -> u64 {
        self.requests_total
            .with_label_values(&[outcome.as_str()])
            .get()
    }

    /// Total attempts recorded for a provider and result
    pub fn attempts_count(&self, provider: &str, result: &str) -> u64 {
        self.provider_attempts
            .with_label_values(&[provider, result])
            .get()
    }

    /// Get the current count of background task failures across all failure types
    pub fn background_task_failures_count(&self) -> u64 {
        let metric_families = self.registry.gather();
        metric_families
            .iter()
            .find(|mf| mf.name() == "tailgate_background_task_failures_total")
            .map(|mf| {
                mf.get_metric()
                    .iter()
                    .map(|m| m.counter.value.unwrap_or(0.0) as u64)
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Gather all metrics and encode them in Prometheus text format
    ///
    /// # Errors
    ///
    /// Returns an error if metric encoding fails.
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();
        let metric_count = metric_families.len();

        tracing::debug!(
            metric_family_count = metric_count,
            "Encoding metrics to Prometheus text format"
        );

        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();

        encoder.encode(&metric_families, &mut buffer).map_err(|e| {
            tracing::error!(
                error = %e,
                metric_family_count = metric_count,
                "Prometheus text encoder failed"
            );
            prometheus::Error::Msg(format!(
                "Failed to encode {} metric families: {}",
                metric_count, e
            ))
        })?;

        String::from_utf8(buffer).map_err(|e| {
            let valid_up_to = e.utf8_error().valid_up_to();
            tracing::error!(
                invalid_byte_index = valid_up_to,
                "Prometheus encoder produced invalid UTF-8"
            );
            prometheus::Error::Msg(format!(
                "Failed to convert metrics to UTF-8 at byte {}: {}",
                valid_up_to, e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new_creates_registry() {
        let metrics = Metrics::new().expect("Failed to create metrics");

        metrics.record_request(RequestOutcome::Served);
        metrics.record_attempt("openai", "success");
        metrics.record_fallback_depth("openai", 1);
        metrics.record_probe("openai", HealthStatus::Healthy);
        metrics.background_task_failure("probe_cycle_panic");

        let output = metrics.gather().expect("Failed to gather metrics");
        assert!(output.contains("tailgate_requests_total"));
        assert!(output.contains("tailgate_provider_attempts_total"));
        assert!(output.contains("tailgate_fallback_depth"));
        assert!(output.contains("tailgate_health_probes_total"));
        assert!(output.contains("tailgate_background_task_failures_total"));
    }

    #[test]
    fn test_request_outcome_labels() {
        let metrics = Metrics::new().unwrap();
        metrics.record_request(RequestOutcome::NoProviders);
        metrics.record_request(RequestOutcome::Exhausted);
        metrics.record_request(RequestOutcome::Exhausted);

        assert_eq!(metrics.requests_count(RequestOutcome::NoProviders), 1);
        assert_eq!(metrics.requests_count(RequestOutcome::Exhausted), 2);
        assert_eq!(metrics.requests_count(RequestOutcome::Served), 0);

        let output = metrics.gather().unwrap();
        assert!(output.contains("outcome=\"no_providers\""));
    }

    #[test]
    fn test_attempt_counts_by_result() {
        let metrics = Metrics::new().unwrap();
        metrics.record_attempt("ollama", "timeout");
        metrics.record_attempt("ollama", "timeout");
        metrics.record_attempt("ollama", "success");

        assert_eq!(metrics.attempts_count("ollama", "timeout"), 2);
        assert_eq!(metrics.attempts_count("ollama", "success"), 1);
    }

    #[test]
    fn test_background_failure_count_sums_labels() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.background_task_failures_count(), 0);
        metrics.background_task_failure("a");
        metrics.background_task_failure("b");
        assert_eq!(metrics.background_task_failures_count(), 2);
    }
}
