//! Request entry point: screen, route, screen again

use crate::config::Config;
use crate::error::{AppError, AppResult, ExecutionError};
use crate::metrics::{Metrics, RequestOutcome};
use crate::routing::{FallbackExecutor, Generation, RoutingTable, SharedRouting};
use crate::security::{BlockDecision, SecurityPipeline};
use serde::Serialize;
use std::sync::{Arc, RwLock};

/// Result of one gateway request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayOutcome {
    Served(Generation),
    Blocked(BlockDecision),
}

/// Sizes after a (re)load, returned by the admin endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReloadSummary {
    pub chain_len: usize,
    pub models: usize,
    pub instance_groups: usize,
    pub providers: usize,
}

impl ReloadSummary {
    fn new(config: &Config, table: &RoutingTable) -> Self {
        Self {
            chain_len: table.chain().len(),
            models: config.routing.models.len(),
            instance_groups: config.routing.instance_groups.len(),
            providers: table.adapters().names().len(),
        }
    }
}

pub struct Gateway {
    routing: Arc<SharedRouting>,
    security: RwLock<Arc<SecurityPipeline>>,
    executor: FallbackExecutor,
    metrics: Arc<Metrics>,
    client: reqwest::Client,
}

impl Gateway {
    pub fn new(
        routing: Arc<SharedRouting>,
        security: SecurityPipeline,
        executor: FallbackExecutor,
        metrics: Arc<Metrics>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            routing,
            security: RwLock::new(Arc::new(security)),
            executor,
            metrics,
            client,
        }
    }

    pub fn routing(&self) -> &Arc<SharedRouting> {
        &self.routing
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    fn security(&self) -> Arc<SecurityPipeline> {
        match self.security.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Screen the prompt, walk the fallback chain and screen the answer
    ///
    /// # Errors
    ///
    /// `Validation` for a blank prompt, `Execution` when no candidate
    /// produced text.
    pub async fn route_and_generate(&self, prompt: &str) -> AppResult<GatewayOutcome> {
        if prompt.trim().is_empty() {
            return Err(AppError::Validation(
                "prompt cannot be empty or contain only whitespace".to_string(),
            ));
        }

        let security = self.security();
        if let Some(decision) = security.check_prompt(prompt) {
            self.metrics.record_request(RequestOutcome::Blocked);
            return Ok(GatewayOutcome::Blocked(decision));
        }

        let table = self.routing.snapshot();
        let generation = match self.executor.execute(prompt, &table).await {
            Ok(generation) => generation,
            Err(e) => {
                self.metrics.record_request(match e {
                    ExecutionError::NoProviders => RequestOutcome::NoProviders,
                    ExecutionError::Exhausted { .. } => RequestOutcome::Exhausted,
                });
                return Err(e.into());
            }
        };

        if let Some(decision) = security.check_response(&generation.text) {
            self.metrics.record_request(RequestOutcome::Blocked);
            return Ok(GatewayOutcome::Blocked(decision));
        }

        self.metrics.record_request(RequestOutcome::Served);
        Ok(GatewayOutcome::Served(generation))
    }

    /// Rebuild the routing table and filters from a validated configuration
    ///
    /// In-flight requests finish on the snapshot they started with.
    pub fn reload(&self, config: &Config) -> ReloadSummary {
        let table = RoutingTable::from_config(config, self.client.clone());
        let summary = ReloadSummary::new(config, &table);

        self.routing.replace(table);
        let security = Arc::new(SecurityPipeline::from_config(&config.security));
        match self.security.write() {
            Ok(mut guard) => *guard = security,
            Err(poisoned) => *poisoned.into_inner() = security,
        }

        tracing::info!(
            chain_len = summary.chain_len,
            models = summary.models,
            instance_groups = summary.instance_groups,
            "Routing configuration reloaded"
        );
        if summary.chain_len == 0 {
            tracing::error!(
                severity = "critical",
                "Reloaded fallback chain is empty, requests will fail"
            );
        }
        summary
    }

    /// Current chain length
    pub fn chain_len(&self) -> usize {
        self.routing.snapshot().chain().len()
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("chain_len", &self.chain_len())
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::SecretChain;
    use std::str::FromStr;

    fn gateway(config: &Config) -> Gateway {
        let client = reqwest::Client::new();
        let metrics = Arc::new(Metrics::new().unwrap());
        Gateway::new(
            Arc::new(SharedRouting::new(RoutingTable::from_config(
                config,
                client.clone(),
            ))),
            SecurityPipeline::from_config(&config.security),
            FallbackExecutor::new(SecretChain::default()).with_metrics(metrics.clone()),
            metrics,
            client,
        )
    }

    const EMPTY: &str = r#"
[server]
host = "127.0.0.1"
port = 3000

[security]
blocked_phrases = ["drop table"]
"#;

    #[tokio::test]
    async fn test_blocked_prompt_never_reaches_providers() {
        let config = Config::from_str(EMPTY).unwrap();
        let gateway = gateway(&config);

        let outcome = gateway
            .route_and_generate("please DROP TABLE users")
            .await
            .unwrap();
        assert!(matches!(outcome, GatewayOutcome::Blocked(_)));
        assert_eq!(gateway.metrics().requests_count(RequestOutcome::Blocked), 1);
    }

    #[tokio::test]
    async fn test_empty_chain_is_reported_as_no_providers() {
        let config = Config::from_str(EMPTY).unwrap();
        let gateway = gateway(&config);

        let err = gateway.route_and_generate("hello").await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Execution(ExecutionError::NoProviders)
        ));
        assert_eq!(
            gateway.metrics().requests_count(RequestOutcome::NoProviders),
            1
        );
    }

    #[tokio::test]
    async fn test_blank_prompt_is_a_validation_error() {
        let config = Config::from_str(EMPTY).unwrap();
        let gateway = gateway(&config);
        assert!(matches!(
            gateway.route_and_generate("  \n").await,
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_reload_swaps_chain() {
        let config = Config::from_str(EMPTY).unwrap();
        let gateway = gateway(&config);
        assert_eq!(gateway.chain_len(), 0);

        let reloaded = Config::from_str(
            r#"
[server]
host = "127.0.0.1"
port = 3000

[[routing.models]]
id = "local"
provider = "ollama"
model = "llama3"

[[routing.fallback_chain]]
ref = "local"
"#,
        )
        .unwrap();
        let summary = gateway.reload(&reloaded);
        assert_eq!(summary.chain_len, 1);
        assert_eq!(summary.models, 1);
        assert_eq!(gateway.chain_len(), 1);
    }
}
