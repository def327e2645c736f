//! Azure OpenAI adapter

use super::{
    Completion, ProviderAdapter, ProviderRequest, chat_completion_text, non_empty, require_key,
    send_json,
};
use crate::error::ProviderError;
use async_trait::async_trait;
use serde_json::json;

const DEFAULT_API_VERSION: &str = "2024-02-01";
const DEFAULT_TEMPERATURE: f64 = 0.7;
const DEFAULT_MAX_TOKENS: u32 = 4000;

#[derive(Debug, Clone)]
pub struct AzureAdapter {
    client: reqwest::Client,
}

impl AzureAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// Deployment URL; the deployment defaults to the model name
pub(crate) fn deployment_url(request: &ProviderRequest<'_>) -> String {
    let deployment = request
        .extra
        .deployment_name
        .as_deref()
        .unwrap_or(request.model);
    let api_version = request
        .extra
        .api_version
        .as_deref()
        .unwrap_or(DEFAULT_API_VERSION);

    format!(
        "{}/openai/deployments/{}/chat/completions?api-version={}",
        request.endpoint.trim_end_matches('/'),
        deployment,
        api_version
    )
}

#[async_trait]
impl ProviderAdapter for AzureAdapter {
    fn name(&self) -> &str {
        "azure"
    }

    fn requires_api_key(&self) -> bool {
        true
    }

    fn secret_name(&self) -> Option<String> {
        Some("AZURE_OPENAI_API_KEY".to_string())
    }

    async fn call(&self, request: ProviderRequest<'_>) -> Result<Completion, ProviderError> {
        let key = require_key(self.name(), request.api_key)?;

        let mut body = json!({
            "messages": [{"role": "user", "content": request.prompt}],
            "temperature": request.extra.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            "max_tokens": request.extra.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        });
        if let Some(top_p) = request.extra.top_p {
            body["top_p"] = json!(top_p);
        }

        let builder = self
            .client
            .post(deployment_url(&request))
            .header("api-key", key.expose())
            .json(&body);

        let body = send_json(builder).await?;
        non_empty(chat_completion_text(&body))
    }
}
