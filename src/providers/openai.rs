//! OpenAI chat-completions adapter

use super::{
    Completion, ProviderAdapter, ProviderRequest, chat_completion_text, is_chat_completions_url,
    non_empty, require_key, send_json,
};
use crate::error::ProviderError;
use async_trait::async_trait;
use serde_json::json;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone)]
pub struct OpenAiAdapter {
    client: reqwest::Client,
}

impl OpenAiAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// `{base}/chat/completions`, unless the endpoint already is one
pub(crate) fn chat_completions_url(endpoint: &str) -> String {
    if is_chat_completions_url(endpoint) {
        endpoint.to_string()
    } else {
        format!("{}/chat/completions", endpoint.trim_end_matches('/'))
    }
}

/// Reasoning models reject sampling parameters
fn is_reasoning_model(model: &str) -> bool {
    model.starts_with("o1")
}

pub(crate) fn build_body(request: &ProviderRequest<'_>) -> serde_json::Value {
    let mut body = json!({
        "model": request.model,
        "messages": [{"role": "user", "content": request.prompt}],
    });

    if !is_reasoning_model(request.model) {
        if let Some(temperature) = request.extra.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = request.extra.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(top_p) = request.extra.top_p {
            body["top_p"] = json!(top_p);
        }
    }

    body
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn name(&self) -> &str {
        "openai"
    }

    fn default_endpoint(&self) -> Option<&str> {
        Some(DEFAULT_BASE_URL)
    }

    fn requires_api_key(&self) -> bool {
        true
    }

    fn secret_name(&self) -> Option<String> {
        Some("OPENAI_API_KEY".to_string())
    }

    async fn call(&self, request: ProviderRequest<'_>) -> Result<Completion, ProviderError> {
        let key = require_key(self.name(), request.api_key)?;

        let builder = self
            .client
            .post(chat_completions_url(request.endpoint))
            .bearer_auth(key.expose())
            .json(&build_body(&request));

        let body = send_json(builder).await?;
        non_empty(chat_completion_text(&body))
    }
}
