//! Google Gemini generateContent adapter

use super::{Completion, ProviderAdapter, ProviderRequest, non_empty, require_key, send_json};
use crate::error::ProviderError;
use async_trait::async_trait;
use serde_json::json;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
pub struct GeminiAdapter {
    client: reqwest::Client,
}

impl GeminiAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

pub(crate) fn generate_url(endpoint: &str, model: &str) -> String {
    if endpoint.contains(":generateContent") {
        endpoint.to_string()
    } else {
        format!(
            "{}/models/{}:generateContent",
            endpoint.trim_end_matches('/'),
            model
        )
    }
}

fn generation_config(request: &ProviderRequest<'_>) -> Option<serde_json::Value> {
    let mut config = serde_json::Map::new();
    if let Some(temperature) = request.extra.temperature {
        config.insert("temperature".into(), json!(temperature));
    }
    if let Some(max_tokens) = request.extra.max_tokens {
        config.insert("maxOutputTokens".into(), json!(max_tokens));
    }
    if let Some(top_p) = request.extra.top_p {
        config.insert("topP".into(), json!(top_p));
    }
    (!config.is_empty()).then_some(serde_json::Value::Object(config))
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn name(&self) -> &str {
        "gemini"
    }

    fn default_endpoint(&self) -> Option<&str> {
        Some(DEFAULT_BASE_URL)
    }

    fn requires_api_key(&self) -> bool {
        true
    }

    fn secret_name(&self) -> Option<String> {
        Some("GEMINI_API_KEY".to_string())
    }

    async fn call(&self, request: ProviderRequest<'_>) -> Result<Completion, ProviderError> {
        let key = require_key(self.name(), request.api_key)?;

        let mut body = json!({
            "contents": [{"parts": [{"text": request.prompt}]}],
        });
        if let Some(config) = generation_config(&request) {
            body["generationConfig"] = config;
        }

        let builder = self
            .client
            .post(generate_url(request.endpoint, request.model))
            .header("x-goog-api-key", key.expose())
            .json(&body);

        let body = send_json(builder).await?;
        let text = body
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        non_empty(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_url() {
        assert_eq!(
            generate_url(DEFAULT_BASE_URL, "gemini-1.5-flash"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent"
        );
        let explicit = "http://proxy/v1beta/models/x:generateContent";
        assert_eq!(generate_url(explicit, "ignored"), explicit);
    }
}
