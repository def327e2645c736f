//! Provider candidates: the concrete steps of a fallback chain
//!
//! Raw configuration entries (`CandidateDef`) carry every field as optional.
//! A `ProviderCandidate` can only be obtained through `TryFrom<&CandidateDef>`,
//! which rejects entries missing a provider or a model, so every candidate
//! that reaches the executor or the prober is valid by construction.

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Secret API key
///
/// Debug output is redacted so keys never reach logs through `{:?}`.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Get the raw key for building request headers
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Placeholder values shipped in sample configs count as "not configured"
    pub fn is_placeholder(&self) -> bool {
        let key = self.0.trim();
        key.is_empty() || key.starts_with("your-") || key == "xxx"
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Provider-specific optional parameters
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct CandidateExtra {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Azure REST API version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    /// Azure deployment name (defaults to the model)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_name: Option<String>,
    /// Distinguishes physical instances serving the same model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    /// Lightweight URL tried by the health prober before the API URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_url: Option<String>,
}

/// A candidate definition as written in configuration
///
/// Used both for `[[routing.models]]` entries (where `id` is required by
/// validation) and for literal `[[routing.fallback_chain]]` entries.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CandidateDef {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<ApiKey>,
    /// Request timeout in seconds
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(flatten)]
    pub extra: CandidateExtra,
}

/// Backend family of a candidate
///
/// Names are matched case-insensitively. Anything that is not one of the
/// native families is `Generic`, served by a template-driven adapter when a
/// template with that name is configured.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Ollama,
    OpenAi,
    Gemini,
    Azure,
    Mistral,
    Generic(String),
}

impl ProviderKind {
    /// Parse a provider name; returns None for blank names
    pub fn parse(name: &str) -> Option<Self> {
        let normalized = name.trim().to_ascii_lowercase();
        let kind = match normalized.as_str() {
            "" => return None,
            "ollama" => Self::Ollama,
            "openai" => Self::OpenAi,
            "gemini" => Self::Gemini,
            "azure" => Self::Azure,
            "mistral" => Self::Mistral,
            _ => Self::Generic(normalized),
        };
        Some(kind)
    }

    /// Normalized name, also the adapter registry key
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::Azure => "azure",
            Self::Mistral => "mistral",
            Self::Generic(name) => name,
        }
    }

    /// Cloud providers need both an endpoint and a key; local ones only an endpoint
    pub fn requires_api_key(&self) -> bool {
        matches!(self, Self::OpenAi | Self::Gemini | Self::Azure)
    }

    /// Whether this is a self-hosted backend
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Ollama | Self::Mistral)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ProviderKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Why a raw definition could not become a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidCandidate {
    MissingProvider,
    MissingModel,
}

impl fmt::Display for InvalidCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingProvider => f.write_str("missing or empty 'provider'"),
            Self::MissingModel => f.write_str("missing or empty 'model'"),
        }
    }
}

impl std::error::Error for InvalidCandidate {}

/// One step in the fallback chain
///
/// Fields are private: the provider/model invariant is established once in
/// `TryFrom<&CandidateDef>` (or `new`) and cannot be broken afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderCandidate {
    provider: ProviderKind,
    model: String,
    id: Option<String>,
    group_id: Option<String>,
    api_url: Option<String>,
    api_key: Option<ApiKey>,
    timeout_seconds: Option<u64>,
    extra: CandidateExtra,
}

impl ProviderCandidate {
    /// Create a candidate with no endpoint, key or extra parameters
    pub fn new(provider: ProviderKind, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            id: None,
            group_id: None,
            api_url: None,
            api_key: None,
            timeout_seconds: None,
            extra: CandidateExtra::default(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Tag this candidate as expanded from an instance group
    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = Some(api_url.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(ApiKey::new(api_key));
        self
    }

    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = Some(timeout_seconds);
        self
    }

    pub fn with_extra(mut self, extra: CandidateExtra) -> Self {
        self.extra = extra;
        self
    }

    pub fn provider(&self) -> &ProviderKind {
        &self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Model definition id this candidate was resolved from, if any
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Instance group this candidate was expanded from, if any
    pub fn group_id(&self) -> Option<&str> {
        self.group_id.as_deref()
    }

    pub fn api_url(&self) -> Option<&str> {
        self.api_url.as_deref()
    }

    pub fn api_key(&self) -> Option<&ApiKey> {
        self.api_key.as_ref()
    }

    pub fn timeout_seconds(&self) -> Option<u64> {
        self.timeout_seconds
    }

    pub fn extra(&self) -> &CandidateExtra {
        &self.extra
    }

    /// Model name qualified by physical instance
    ///
    /// `model@instance_id` when an explicit instance id is configured,
    /// `model:port` when the endpoint names a port, else the bare model.
    pub fn instance_qualified_model(&self) -> String {
        if let Some(instance_id) = self.extra.instance_id.as_deref().filter(|s| !s.is_empty()) {
            return format!("{}@{}", self.model, instance_id);
        }

        let port = self
            .api_url
            .as_deref()
            .and_then(|url| reqwest::Url::parse(url).ok())
            .and_then(|url| url.port());

        match port {
            Some(port) => format!("{}:{}", self.model, port),
            None => self.model.clone(),
        }
    }

    /// Health cache key: `provider:instance_qualified_model`
    pub fn health_key(&self) -> String {
        format!("{}:{}", self.provider, self.instance_qualified_model())
    }
}

impl fmt::Display for ProviderCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.model)
    }
}

impl TryFrom<&CandidateDef> for ProviderCandidate {
    type Error = InvalidCandidate;

    fn try_from(def: &CandidateDef) -> Result<Self, Self::Error> {
        let provider = def
            .provider
            .as_deref()
            .and_then(ProviderKind::parse)
            .ok_or(InvalidCandidate::MissingProvider)?;

        let model = def
            .model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .ok_or(InvalidCandidate::MissingModel)?;

        Ok(Self {
            provider,
            model: model.to_string(),
            id: def.id.clone(),
            group_id: None,
            api_url: def.api_url.clone().filter(|u| !u.trim().is_empty()),
            api_key: def.api_key.clone().filter(|k| !k.is_placeholder()),
            timeout_seconds: def.timeout,
            extra: def.extra.clone(),
        })
    }
}
