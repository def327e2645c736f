//! Configuration management for Tailgate
//!
//! Parses TOML configuration files and provides typed access to settings.

use crate::error::{AppError, AppResult};
use crate::routing::{ApiKey, CandidateDef, ChainEntry, InstanceGroupDef};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Upper bound for health intervals, TTLs and probe timeouts
const MAX_HEALTH_SECONDS: u64 = 3600;

/// Upper bound for per-candidate request timeouts
const MAX_REQUEST_TIMEOUT_SECONDS: u64 = 600;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    /// Provider-level endpoint/key overrides, keyed by provider name
    #[serde(default)]
    pub providers: HashMap<String, ProviderSettings>,
    /// Global endpoint/key fallback for every provider
    #[serde(default)]
    pub defaults: ProviderSettings,
    /// Generic adapter templates, keyed by provider name
    #[serde(default)]
    pub templates: HashMap<String, TemplateConfig>,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Raw routing configuration: definitions plus the ordered chain
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoutingConfig {
    #[serde(default)]
    pub models: Vec<CandidateDef>,
    #[serde(default)]
    pub instance_groups: Vec<InstanceGroupDef>,
    #[serde(default)]
    pub fallback_chain: Vec<ChainEntry>,
}

/// Endpoint and credential override
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<ApiKey>,
}

/// Request template for a provider without a native adapter
///
/// `payload` and `headers` may contain `{model}`, `{prompt}` and `{api_key}`
/// placeholders.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateConfig {
    #[serde(default)]
    pub api_url: Option<String>,
    /// Default request timeout in seconds
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
    /// Dotted path to the response text (e.g. `content.0.text`)
    #[serde(default)]
    pub response_path: Option<String>,
}

/// Health tracking configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_health_enabled")]
    pub enabled: bool,
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
    #[serde(default = "default_probe_timeout_seconds")]
    pub probe_timeout_seconds: u64,
    #[serde(default = "default_connect_timeout_seconds")]
    pub connect_timeout_seconds: u64,
    #[serde(default)]
    pub redis_url: Option<String>,
}

impl HealthConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_seconds)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: default_health_enabled(),
            ttl_seconds: default_ttl_seconds(),
            interval_seconds: default_interval_seconds(),
            probe_timeout_seconds: default_probe_timeout_seconds(),
            connect_timeout_seconds: default_connect_timeout_seconds(),
            redis_url: None,
        }
    }
}

fn default_health_enabled() -> bool {
    true
}

fn default_ttl_seconds() -> u64 {
    300
}

fn default_interval_seconds() -> u64 {
    60
}

fn default_probe_timeout_seconds() -> u64 {
    5
}

fn default_connect_timeout_seconds() -> u64 {
    2
}

/// Security pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub blocked_phrases: Vec<String>,
    /// Maximum prompt length in characters; 0 disables the check
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            blocked_phrases: Vec::new(),
            max_prompt_chars: default_max_prompt_chars(),
        }
    }
}

fn default_max_prompt_chars() -> usize {
    32_000
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path_display = path.as_ref().display().to_string();

        // Phase 1: Read file (preserves io::Error context)
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|source| AppError::ConfigFileRead {
                path: path_display.clone(),
                source,
            })?;

        // Phase 2: Parse TOML (preserves toml::de::Error context)
        let config: Self =
            toml::from_str(&content).map_err(|source| AppError::ConfigParseFailed {
                path: path_display.clone(),
                source,
            })?;

        // Phase 3: Validate parsed config (provides contextual reason)
        config
            .validate()
            .map_err(|e| AppError::ConfigValidationFailed {
                path: path_display,
                reason: e.to_string(),
            })?;

        Ok(config)
    }

    /// Validate configuration after parsing
    ///
    /// This is called automatically by `from_file()`, but can also be called
    /// explicitly when constructing Config via other means (e.g., in tests).
    ///
    /// Broken references in the fallback chain are not validation errors;
    /// they are dropped with a warning at resolution.
    pub fn validate(&self) -> AppResult<()> {
        if self.server.port == 0 {
            return Err(AppError::Config(
                "server.port must be greater than 0".to_string(),
            ));
        }

        self.validate_health()?;
        self.validate_models()?;
        self.validate_instance_groups()?;

        for (index, entry) in self.routing.fallback_chain.iter().enumerate() {
            if let ChainEntry::Literal(def) = entry {
                validate_candidate_fields(&format!("routing.fallback_chain[{}]", index), def)?;
            }
        }

        for (name, settings) in &self.providers {
            if let Some(url) = &settings.api_url {
                validate_url(&format!("providers.{}.api_url", name), url)?;
            }
        }
        if let Some(url) = &self.defaults.api_url {
            validate_url("defaults.api_url", url)?;
        }

        for (name, template) in &self.templates {
            if let Some(url) = &template.api_url {
                validate_url(&format!("templates.{}.api_url", name), url)?;
            }
            if let Some(timeout) = template.timeout {
                validate_timeout(&format!("templates.{}.timeout", name), timeout)?;
            }
        }

        Ok(())
    }

    fn validate_health(&self) -> AppResult<()> {
        for (field, value) in [
            ("health.ttl_seconds", self.health.ttl_seconds),
            ("health.interval_seconds", self.health.interval_seconds),
            ("health.probe_timeout_seconds", self.health.probe_timeout_seconds),
            (
                "health.connect_timeout_seconds",
                self.health.connect_timeout_seconds,
            ),
        ] {
            if value == 0 || value > MAX_HEALTH_SECONDS {
                return Err(AppError::Config(format!(
                    "{} must be between 1 and {} seconds, got {}",
                    field, MAX_HEALTH_SECONDS, value
                )));
            }
        }

        if let Some(url) = &self.health.redis_url {
            let valid = ["redis://", "rediss://", "unix://"]
                .iter()
                .any(|scheme| url.starts_with(scheme));
            if !valid {
                return Err(AppError::Config(format!(
                    "health.redis_url '{}' must start with 'redis://', 'rediss://' or 'unix://'",
                    url
                )));
            }
        }

        Ok(())
    }

    /// Entries missing an id, provider or model are left for the resolver to
    /// warn about and drop; only ids and present field values are checked here.
    fn validate_models(&self) -> AppResult<()> {
        let mut seen = HashSet::new();

        for (index, def) in self.routing.models.iter().enumerate() {
            let id = def.id.as_deref().map(str::trim).filter(|id| !id.is_empty());

            if let Some(id) = id
                && !seen.insert(id)
            {
                return Err(AppError::Config(format!(
                    "Duplicate model id '{}' in routing.models",
                    id
                )));
            }

            let location = match id {
                Some(id) => format!("model '{}'", id),
                None => format!("routing.models[{}]", index),
            };
            validate_candidate_fields(&location, def)?;
        }

        Ok(())
    }

    fn validate_instance_groups(&self) -> AppResult<()> {
        let mut seen = HashSet::new();

        for group in &self.routing.instance_groups {
            if group.id.trim().is_empty() {
                return Err(AppError::Config(
                    "routing.instance_groups entry has an empty 'id'".to_string(),
                ));
            }
            if !seen.insert(group.id.as_str()) {
                return Err(AppError::Config(format!(
                    "Duplicate instance group id '{}'",
                    group.id
                )));
            }
            if group.models.is_empty() {
                return Err(AppError::Config(format!(
                    "Instance group '{}' has no models",
                    group.id
                )));
            }
        }

        Ok(())
    }
}

fn validate_candidate_fields(location: &str, def: &CandidateDef) -> AppResult<()> {
    if let Some(url) = &def.api_url {
        validate_url(&format!("{} api_url", location), url)?;
    }
    if let Some(url) = &def.extra.health_check_url {
        validate_url(&format!("{} health_check_url", location), url)?;
    }
    if let Some(timeout) = def.timeout {
        validate_timeout(&format!("{} timeout", location), timeout)?;
    }
    if let Some(temperature) = def.extra.temperature
        && !(0.0..=2.0).contains(&temperature)
    {
        return Err(AppError::Config(format!(
            "{} temperature {} must be a finite number between 0.0 and 2.0",
            location, temperature
        )));
    }
    if def.extra.max_tokens == Some(0) {
        return Err(AppError::Config(format!(
            "{} max_tokens must be greater than 0",
            location
        )));
    }
    Ok(())
}

fn validate_url(field: &str, url: &str) -> AppResult<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(AppError::Config(format!(
            "{} '{}' must start with 'http://' or 'https://'",
            field, url
        )))
    }
}

fn validate_timeout(field: &str, timeout: u64) -> AppResult<()> {
    if timeout == 0 || timeout > MAX_REQUEST_TIMEOUT_SECONDS {
        return Err(AppError::Config(format!(
            "{} must be between 1 and {} seconds, got {}",
            field, MAX_REQUEST_TIMEOUT_SECONDS, timeout
        )));
    }
    Ok(())
}

impl FromStr for Config {
    type Err = AppError;

    fn from_str(toml_str: &str) -> Result<Self, Self::Err> {
        let config: Config =
            toml::from_str(toml_str).map_err(|source| AppError::ConfigParseFailed {
                path: "<string>".to_string(),
                source,
            })?;

        // Validate config before returning
        config.validate()?;
        Ok(config)
    }
}
