//! HTTP request handlers for the Tailgate API

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::gateway::Gateway;
use crate::health::{HealthCache, HealthMonitor, HealthProber, ProbeTransport, ReqwestTransport};
use crate::metrics::Metrics;
use crate::providers::SecretChain;
use crate::routing::{FallbackExecutor, RoutingTable, SharedRouting};
use crate::security::SecurityPipeline;
use std::path::PathBuf;
use std::sync::Arc;

pub mod admin;
pub mod chat;
pub mod health;
pub mod metrics;

/// Application state shared across all handlers
///
/// All fields are Arc'd for cheap cloning across Axum handlers.
#[derive(Clone)]
pub struct AppState {
    gateway: Arc<Gateway>,
    cache: Arc<HealthCache>,
    monitor: Arc<HealthMonitor>,
    metrics: Arc<Metrics>,
    config_path: Option<Arc<PathBuf>>,
}

impl AppState {
    /// Assemble state from prebuilt components
    pub fn new(
        gateway: Arc<Gateway>,
        cache: Arc<HealthCache>,
        monitor: Arc<HealthMonitor>,
        config_path: Option<PathBuf>,
    ) -> Self {
        let metrics = Arc::clone(gateway.metrics());
        Self {
            gateway,
            cache,
            monitor,
            metrics,
            config_path: config_path.map(Arc::new),
        }
    }

    /// Build every component from configuration
    ///
    /// Probes go through `transport`; provider calls share one HTTP client.
    /// Nothing is spawned here, the caller starts the monitor.
    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails.
    pub fn from_config(
        config: &Config,
        client: reqwest::Client,
        transport: Arc<dyn ProbeTransport>,
        secrets: SecretChain,
        config_path: Option<PathBuf>,
    ) -> AppResult<Self> {
        let metrics = Arc::new(
            Metrics::new().map_err(|e| AppError::Internal(format!("metrics registry: {}", e)))?,
        );
        let cache = Arc::new(HealthCache::from_config(&config.health));
        let routing = Arc::new(SharedRouting::new(RoutingTable::from_config(
            config,
            client.clone(),
        )));

        let executor = FallbackExecutor::new(secrets.clone())
            .with_metrics(Arc::clone(&metrics))
            .with_cache(Arc::clone(&cache));
        let gateway = Arc::new(Gateway::new(
            Arc::clone(&routing),
            SecurityPipeline::from_config(&config.security),
            executor,
            Arc::clone(&metrics),
            client,
        ));

        let prober = Arc::new(HealthProber::new(
            transport,
            secrets,
            config.health.probe_timeout(),
            config.health.connect_timeout(),
        ));
        let monitor = Arc::new(HealthMonitor::new(
            routing,
            prober,
            Arc::clone(&cache),
            Arc::clone(&metrics),
            config.health.interval(),
        ));

        Ok(Self::new(gateway, cache, monitor, config_path))
    }

    /// `from_config` with the real network transport and environment secrets
    pub fn from_config_default(
        config: &Config,
        client: reqwest::Client,
        config_path: Option<PathBuf>,
    ) -> AppResult<Self> {
        let transport = Arc::new(ReqwestTransport::new(client.clone()));
        Self::from_config(config, client, transport, SecretChain::from_env(), config_path)
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn cache(&self) -> &HealthCache {
        &self.cache
    }

    pub fn monitor(&self) -> &Arc<HealthMonitor> {
        &self.monitor
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// File re-read by `POST /admin/reload`
    pub fn config_path(&self) -> Option<&PathBuf> {
        self.config_path.as_deref()
    }
}
