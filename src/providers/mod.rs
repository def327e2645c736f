//! Provider adapters
//!
//! Every backend API sits behind `ProviderAdapter`. Adapters turn transport
//! and decoding failures into `ProviderError` values; the executor decides
//! what to do next.

pub mod azure;
pub mod gemini;
pub mod generic;
pub mod mistral;
pub mod ndjson;
pub mod ollama;
pub mod openai;
pub mod registry;
pub mod secrets;

pub use registry::AdapterRegistry;
pub use secrets::{EnvSecretProvider, SecretChain, SecretProvider};

use crate::error::ProviderError;
use crate::routing::{ApiKey, CandidateExtra};
use async_trait::async_trait;
use std::time::Duration;

/// Request timeout for cloud and template providers
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Request timeout for self-hosted providers
pub const LOCAL_TIMEOUT_SECONDS: u64 = 60;

/// Default endpoint of a local Ollama daemon
pub const OLLAMA_GENERATE_URL: &str = "http://localhost:11434/api/generate";

/// One adapter call
///
/// Adapters set no request timeout of their own; the fallback executor bounds
/// every call with the candidate's timeout.
#[derive(Debug, Clone, Copy)]
pub struct ProviderRequest<'a> {
    pub prompt: &'a str,
    pub model: &'a str,
    /// Effective endpoint after precedence resolution
    pub endpoint: &'a str,
    pub api_key: Option<&'a ApiKey>,
    pub extra: &'a CandidateExtra,
}

/// Generated text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
}

impl Completion {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Uniform call contract over heterogeneous backend APIs
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Normalized provider name this adapter serves
    fn name(&self) -> &str;

    /// Endpoint used when no candidate, provider or global URL is configured
    fn default_endpoint(&self) -> Option<&str> {
        None
    }

    fn default_timeout(&self) -> Duration {
        Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)
    }

    /// Cloud APIs refuse anonymous requests
    fn requires_api_key(&self) -> bool {
        false
    }

    /// Secret name looked up when no key is configured
    fn secret_name(&self) -> Option<String> {
        None
    }

    async fn call(&self, request: ProviderRequest<'_>) -> Result<Completion, ProviderError>;
}

/// Whether an endpoint speaks the OpenAI chat-completions protocol
pub fn is_chat_completions_url(url: &str) -> bool {
    let path = url.split('?').next().unwrap_or(url).trim_end_matches('/');
    path.ends_with("/chat/completions")
}

/// Send a prepared request and decode a JSON body, mapping every failure
/// onto `ProviderError`
pub(crate) async fn send_json(
    builder: reqwest::RequestBuilder,
) -> Result<serde_json::Value, ProviderError> {
    let response = builder.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::from_status(status.as_u16(), &body));
    }

    response
        .json::<serde_json::Value>()
        .await
        .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
}

/// `choices[0].message.content` of an OpenAI-style response
pub(crate) fn chat_completion_text(body: &serde_json::Value) -> Option<String> {
    body.pointer("/choices/0/message/content")
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

/// Reject missing or whitespace-only text
pub(crate) fn non_empty(text: Option<String>) -> Result<Completion, ProviderError> {
    match text {
        Some(text) if !text.trim().is_empty() => Ok(Completion { text }),
        _ => Err(ProviderError::EmptyResponse),
    }
}

/// Key required by a cloud adapter
pub(crate) fn require_key<'a>(
    provider: &str,
    api_key: Option<&'a ApiKey>,
) -> Result<&'a ApiKey, ProviderError> {
    api_key.ok_or_else(|| ProviderError::MissingCredential {
        provider: provider.to_string(),
    })
}
