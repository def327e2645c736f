//! Template-driven adapter for providers without native support
//!
//! Payload and header templates come from `[templates.<name>]`. String leaves
//! have `{model}`, `{prompt}` and `{api_key}` substituted in a single pass, so
//! placeholder-looking text inside the prompt is never expanded again.

use super::{Completion, DEFAULT_TIMEOUT_SECONDS, ProviderAdapter, ProviderRequest, non_empty, send_json};
use crate::config::TemplateConfig;
use crate::error::ProviderError;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::time::Duration;

/// Templates available without any configuration
///
/// Configured templates with the same name override these field by field.
pub fn builtin_templates() -> BTreeMap<&'static str, TemplateConfig> {
    BTreeMap::from([(
        "claude",
        TemplateConfig {
            payload: Some(json!({"model": "{model}", "prompt": "{prompt}"})),
            headers: BTreeMap::from([(
                "Authorization".to_string(),
                "Bearer {api_key}".to_string(),
            )]),
            ..TemplateConfig::default()
        },
    )])
}

/// Overlay `custom` on `base`; set fields of `custom` win
pub fn merge_templates(base: &TemplateConfig, custom: &TemplateConfig) -> TemplateConfig {
    TemplateConfig {
        api_url: custom.api_url.clone().or_else(|| base.api_url.clone()),
        timeout: custom.timeout.or(base.timeout),
        headers: if custom.headers.is_empty() {
            base.headers.clone()
        } else {
            custom.headers.clone()
        },
        payload: custom.payload.clone().or_else(|| base.payload.clone()),
        response_path: custom
            .response_path
            .clone()
            .or_else(|| base.response_path.clone()),
    }
}

#[derive(Debug, Clone)]
pub struct GenericAdapter {
    name: String,
    template: TemplateConfig,
    client: reqwest::Client,
}

impl GenericAdapter {
    pub fn new(name: impl Into<String>, template: TemplateConfig, client: reqwest::Client) -> Self {
        Self {
            name: name.into().to_ascii_lowercase(),
            template,
            client,
        }
    }
}

/// Replace placeholders in one left-to-right scan
pub(crate) fn fill_placeholders(input: &str, model: &str, prompt: &str, api_key: &str) -> String {
    let mut out = String::with_capacity(input.len() + prompt.len());
    let mut rest = input;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];

        let replacement = [("{model}", model), ("{prompt}", prompt), ("{api_key}", api_key)]
            .into_iter()
            .find(|(placeholder, _)| tail.starts_with(placeholder));

        match replacement {
            Some((placeholder, value)) => {
                out.push_str(value);
                rest = &tail[placeholder.len()..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

/// Recursively substitute placeholders in string leaves
pub(crate) fn substitute(template: &Value, model: &str, prompt: &str, api_key: &str) -> Value {
    match template {
        Value::String(s) => Value::String(fill_placeholders(s, model, prompt, api_key)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| substitute(item, model, prompt, api_key))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute(v, model, prompt, api_key)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Follow a dotted path; numeric segments index arrays
fn lookup_path<'a>(body: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(body, |value, segment| match segment.parse::<usize>() {
            Ok(index) => value.get(index),
            Err(_) => value.get(segment),
        })
}

/// Text from a configured path or from the common response envelopes
pub(crate) fn extract_text(body: &Value, response_path: Option<&str>) -> Option<String> {
    if let Some(path) = response_path {
        return lookup_path(body, path)
            .and_then(|v| v.as_str())
            .map(str::to_string);
    }

    const ENVELOPES: [&str; 7] = [
        "/choices/0/message/content",
        "/choices/0/text",
        "/message/content",
        "/content/0/text",
        "/candidates/0/content/parts/0/text",
        "/response",
        "/text",
    ];

    if let Some(text) = body.as_str() {
        return Some(text.to_string());
    }

    ENVELOPES
        .iter()
        .find_map(|pointer| body.pointer(pointer).and_then(|v| v.as_str()))
        .or_else(|| body.get("completion").and_then(|v| v.as_str()))
        .or_else(|| body.get("output").and_then(|v| v.as_str()))
        .map(str::to_string)
}

#[async_trait]
impl ProviderAdapter for GenericAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_endpoint(&self) -> Option<&str> {
        self.template.api_url.as_deref()
    }

    fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.template.timeout.unwrap_or(DEFAULT_TIMEOUT_SECONDS))
    }

    fn secret_name(&self) -> Option<String> {
        let normalized: String = self
            .name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        Some(format!("{}_API_KEY", normalized))
    }

    async fn call(&self, request: ProviderRequest<'_>) -> Result<Completion, ProviderError> {
        let api_key = request.api_key.map(|k| k.expose()).unwrap_or_default();

        let payload_template = self
            .template
            .payload
            .clone()
            .unwrap_or_else(|| json!({"model": "{model}", "prompt": "{prompt}"}));
        let payload = substitute(&payload_template, request.model, request.prompt, api_key);

        let mut builder = self
            .client
            .post(request.endpoint)
            .json(&payload);
        for (name, value) in &self.template.headers {
            let value = fill_placeholders(value, request.model, request.prompt, api_key);
            // A header that was only a key placeholder is dropped when there is no key
            if value.trim().is_empty() || value.trim() == "Bearer" {
                continue;
            }
            builder = builder.header(name.as_str(), value);
        }

        let body = send_json(builder).await?;
        non_empty(extract_text(&body, self.template.response_path.as_deref()))
    }
}
