//! Ordered fallback over the resolved chain
//!
//! The executor never consults health state before a call: every candidate
//! is tried in chain order, one call each, until one returns text. Health is
//! only touched afterwards, by invalidating the cache entries of candidates
//! that failed.

use super::{ProviderCandidate, RoutingTable};
use crate::error::{ExecutionError, FailedAttempt, ProviderError};
use crate::health::HealthCache;
use crate::metrics::Metrics;
use crate::providers::{Completion, ProviderRequest, SecretChain};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Text produced by the first candidate that succeeded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Generation {
    pub text: String,
    pub provider: String,
    pub model: String,
    /// Model definition id the serving candidate came from
    pub candidate_id: Option<String>,
    /// Instance group the serving candidate was expanded from
    pub group_id: Option<String>,
    /// Zero-based chain position
    pub position: usize,
    /// Candidates tried before this one
    #[serde(skip)]
    pub attempts: Vec<FailedAttempt>,
}

/// Walks a `FallbackChain`, dispatching to provider adapters
#[derive(Clone, Default)]
pub struct FallbackExecutor {
    secrets: SecretChain,
    metrics: Option<Arc<Metrics>>,
    cache: Option<Arc<HealthCache>>,
}

impl FallbackExecutor {
    pub fn new(secrets: SecretChain) -> Self {
        Self {
            secrets,
            metrics: None,
            cache: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Invalidate cache entries of failed candidates
    pub fn with_cache(mut self, cache: Arc<HealthCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn secrets(&self) -> &SecretChain {
        &self.secrets
    }

    /// Try candidates in order until one produces text
    ///
    /// # Errors
    ///
    /// `NoProviders` when the chain is empty, `Exhausted` (with every
    /// attempt) when all candidates failed or were skipped.
    pub async fn execute(
        &self,
        prompt: &str,
        table: &RoutingTable,
    ) -> Result<Generation, ExecutionError> {
        let chain = table.chain();
        if chain.is_empty() {
            tracing::error!(
                severity = "critical",
                "No providers configured in the fallback chain, cannot serve request"
            );
            return Err(ExecutionError::NoProviders);
        }

        let mut attempts = Vec::new();

        for (position, candidate) in chain.iter().enumerate() {
            tracing::debug!(
                provider = %candidate.provider(),
                model = %candidate.model(),
                position,
                "Trying provider"
            );

            match self.attempt(prompt, candidate, table).await {
                Ok(completion) => {
                    self.record_attempt(candidate, "success");
                    if let Some(metrics) = &self.metrics {
                        metrics.record_fallback_depth(candidate.provider().as_str(), position);
                    }
                    tracing::info!(
                        provider = %candidate.provider(),
                        model = %candidate.model(),
                        group_id = candidate.group_id().unwrap_or(""),
                        position,
                        failed_before = attempts.len(),
                        "Request served"
                    );

                    return Ok(Generation {
                        text: completion.text,
                        provider: candidate.provider().to_string(),
                        model: candidate.model().to_string(),
                        candidate_id: candidate.id().map(str::to_string),
                        group_id: candidate.group_id().map(str::to_string),
                        position,
                        attempts,
                    });
                }
                Err(error) => {
                    self.record_attempt(candidate, error.kind());
                    match &error {
                        ProviderError::Unsupported(_) => tracing::error!(
                            provider = %candidate.provider(),
                            model = %candidate.model(),
                            position,
                            "Provider is not recognized and has no template, skipping"
                        ),
                        _ => tracing::warn!(
                            provider = %candidate.provider(),
                            model = %candidate.model(),
                            position,
                            error_type = error.kind(),
                            error = %error,
                            "Provider failed, falling back to next candidate"
                        ),
                    }

                    self.invalidate_detached(candidate);
                    attempts.push(FailedAttempt {
                        position,
                        provider: candidate.provider().to_string(),
                        model: candidate.model().to_string(),
                        error,
                    });
                }
            }
        }

        tracing::error!(
            attempted = attempts.len(),
            "All providers in the fallback chain failed"
        );
        Err(ExecutionError::Exhausted { attempts })
    }

    /// One call against one candidate, bounded by its timeout
    async fn attempt(
        &self,
        prompt: &str,
        candidate: &ProviderCandidate,
        table: &RoutingTable,
    ) -> Result<Completion, ProviderError> {
        let provider = candidate.provider().as_str();

        let adapter = table
            .adapter_for(candidate)
            .ok_or_else(|| ProviderError::Unsupported(provider.to_string()))?;

        let endpoint = table
            .effective_url(candidate)
            .ok_or_else(|| ProviderError::MissingEndpoint {
                provider: provider.to_string(),
            })?;

        let api_key = table.effective_key(candidate, &self.secrets).await;
        if api_key.is_none() && (adapter.requires_api_key() || candidate.provider().requires_api_key())
        {
            return Err(ProviderError::MissingCredential {
                provider: provider.to_string(),
            });
        }

        let timeout = candidate
            .timeout_seconds()
            .map(Duration::from_secs)
            .unwrap_or_else(|| adapter.default_timeout());

        let request = ProviderRequest {
            prompt,
            model: candidate.model(),
            endpoint: &endpoint,
            api_key: api_key.as_ref(),
            extra: candidate.extra(),
        };

        let completion = tokio::time::timeout(timeout, adapter.call(request))
            .await
            .map_err(|_| ProviderError::Timeout {
                timeout_seconds: timeout.as_secs(),
            })??;

        if completion.text.trim().is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        Ok(completion)
    }

    fn record_attempt(&self, candidate: &ProviderCandidate, result: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_attempt(candidate.provider().as_str(), result);
        }
    }

    /// Drop the candidate's cached health without blocking the request
    fn invalidate_detached(&self, candidate: &ProviderCandidate) {
        let Some(cache) = self.cache.clone() else {
            return;
        };
        let provider = candidate.provider().as_str().to_string();
        let key = candidate.instance_qualified_model();
        tokio::spawn(async move {
            cache.invalidate(&provider, &key).await;
        });
    }
}

impl std::fmt::Debug for FallbackExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackExecutor")
            .field("secrets", &self.secrets)
            .field("metrics", &self.metrics.is_some())
            .field("cache", &self.cache)
            .finish()
    }
}
