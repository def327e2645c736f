//! Mistral served through an Ollama-compatible generate endpoint
//!
//! Unlike plain Ollama, deployments are often behind a proxy that expects a
//! bearer token, so a key is looked up (but never required).

use super::ollama::stream_generate;
use super::{
    Completion, LOCAL_TIMEOUT_SECONDS, OLLAMA_GENERATE_URL, ProviderAdapter, ProviderRequest,
};
use crate::error::ProviderError;
use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct MistralAdapter {
    client: reqwest::Client,
}

impl MistralAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProviderAdapter for MistralAdapter {
    fn name(&self) -> &str {
        "mistral"
    }

    fn default_endpoint(&self) -> Option<&str> {
        Some(OLLAMA_GENERATE_URL)
    }

    fn default_timeout(&self) -> Duration {
        Duration::from_secs(LOCAL_TIMEOUT_SECONDS)
    }

    fn secret_name(&self) -> Option<String> {
        Some("MISTRAL_API_KEY".to_string())
    }

    async fn call(&self, request: ProviderRequest<'_>) -> Result<Completion, ProviderError> {
        stream_generate(&self.client, &request, request.api_key).await
    }
}
