//! Ollama adapter for self-hosted models
//!
//! Speaks the native streaming generate protocol by default. Endpoints
//! shaped like `/v1/chat/completions` or `/api/chat` receive a
//! non-streaming chat body instead.

use super::ndjson::collect_generate_stream;
use super::{
    Completion, LOCAL_TIMEOUT_SECONDS, OLLAMA_GENERATE_URL, ProviderAdapter, ProviderRequest,
    chat_completion_text, is_chat_completions_url, non_empty, send_json,
};
use crate::error::ProviderError;
use crate::routing::{ApiKey, CandidateExtra};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct OllamaAdapter {
    client: reqwest::Client,
}

impl OllamaAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn is_chat_endpoint(url: &str) -> bool {
    is_chat_completions_url(url) || url.trim_end_matches('/').ends_with("/api/chat")
}

/// Ollama `options` block; `num_predict` is its max-token knob
pub(crate) fn generation_options(extra: &CandidateExtra) -> Option<serde_json::Value> {
    let mut options = serde_json::Map::new();
    if let Some(max_tokens) = extra.max_tokens {
        options.insert("num_predict".into(), json!(max_tokens));
    }
    if let Some(temperature) = extra.temperature {
        options.insert("temperature".into(), json!(temperature));
    }
    if let Some(top_p) = extra.top_p {
        options.insert("top_p".into(), json!(top_p));
    }
    (!options.is_empty()).then_some(serde_json::Value::Object(options))
}

/// POST a streaming generate request and concatenate the fragments
pub(crate) async fn stream_generate(
    client: &reqwest::Client,
    request: &ProviderRequest<'_>,
    bearer: Option<&ApiKey>,
) -> Result<Completion, ProviderError> {
    let mut body = json!({
        "model": request.model,
        "prompt": request.prompt,
        "stream": true,
    });
    if let Some(options) = generation_options(request.extra) {
        body["options"] = options;
    }

    let mut builder = client
        .post(request.endpoint)
        .json(&body);
    if let Some(key) = bearer {
        builder = builder.bearer_auth(key.expose());
    }

    let response = builder.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::from_status(status.as_u16(), &body));
    }

    let text = collect_generate_stream(response).await?;
    non_empty(Some(text))
}

#[async_trait]
impl ProviderAdapter for OllamaAdapter {
    fn name(&self) -> &str {
        "ollama"
    }

    fn default_endpoint(&self) -> Option<&str> {
        Some(OLLAMA_GENERATE_URL)
    }

    fn default_timeout(&self) -> Duration {
        Duration::from_secs(LOCAL_TIMEOUT_SECONDS)
    }

    async fn call(&self, request: ProviderRequest<'_>) -> Result<Completion, ProviderError> {
        if !is_chat_endpoint(request.endpoint) {
            return stream_generate(&self.client, &request, request.api_key).await;
        }

        let mut body = json!({
            "model": request.model,
            "messages": [{"role": "user", "content": request.prompt}],
            "stream": false,
        });
        if let Some(options) = generation_options(request.extra) {
            body["options"] = options;
        }

        let mut builder = self
            .client
            .post(request.endpoint)
            .json(&body);
        if let Some(key) = request.api_key {
            builder = builder.bearer_auth(key.expose());
        }

        let body = send_json(builder).await?;
        let text = body
            .pointer("/message/content")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| chat_completion_text(&body));
        non_empty(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_endpoint_detection() {
        assert!(is_chat_endpoint("http://localhost:11434/v1/chat/completions"));
        assert!(is_chat_endpoint("http://localhost:11434/api/chat"));
        assert!(!is_chat_endpoint(OLLAMA_GENERATE_URL));
    }

    #[test]
    fn test_generation_options() {
        assert_eq!(generation_options(&CandidateExtra::default()), None);

        let extra = CandidateExtra {
            max_tokens: Some(128),
            top_p: Some(0.9),
            ..CandidateExtra::default()
        };
        let options = generation_options(&extra).unwrap();
        assert_eq!(options["num_predict"], json!(128));
        assert_eq!(options["top_p"], json!(0.9));
        assert!(options.get("temperature").is_none());
    }
}
