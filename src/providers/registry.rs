//! Provider name to adapter dispatch

use super::azure::AzureAdapter;
use super::gemini::GeminiAdapter;
use super::generic::{GenericAdapter, builtin_templates, merge_templates};
use super::mistral::MistralAdapter;
use super::ollama::OllamaAdapter;
use super::openai::OpenAiAdapter;
use super::ProviderAdapter;
use crate::config::{Config, TemplateConfig};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Native adapters; templates with these names are ignored
const NATIVE_PROVIDERS: [&str; 5] = ["ollama", "openai", "gemini", "azure", "mistral"];

/// Adapters keyed by lower-case provider name
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own name, replacing any previous one
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters
            .insert(adapter.name().to_ascii_lowercase(), adapter);
    }

    /// The five native adapters sharing one HTTP client
    pub fn with_builtins(client: reqwest::Client) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(OllamaAdapter::new(client.clone())));
        registry.register(Arc::new(MistralAdapter::new(client.clone())));
        registry.register(Arc::new(OpenAiAdapter::new(client.clone())));
        registry.register(Arc::new(AzureAdapter::new(client.clone())));
        registry.register(Arc::new(GeminiAdapter::new(client)));
        registry
    }

    /// Native adapters plus one generic adapter per template
    pub fn from_config(config: &Config, client: reqwest::Client) -> Self {
        let mut registry = Self::with_builtins(client.clone());

        let mut templates: HashMap<String, TemplateConfig> = builtin_templates()
            .into_iter()
            .map(|(name, template)| (name.to_string(), template))
            .collect();
        for (name, custom) in &config.templates {
            let name = name.trim().to_ascii_lowercase();
            let merged = match templates.get(&name) {
                Some(base) => merge_templates(base, custom),
                None => custom.clone(),
            };
            templates.insert(name, merged);
        }

        for (name, template) in templates {
            if NATIVE_PROVIDERS.contains(&name.as_str()) {
                tracing::warn!(
                    provider = %name,
                    "Template ignored: provider has a native adapter"
                );
                continue;
            }
            registry.register(Arc::new(GenericAdapter::new(
                name,
                template,
                client.clone(),
            )));
        }

        registry
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters
            .get(&name.trim().to_ascii_lowercase())
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Registered provider names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.adapters.keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("providers", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_builtins_are_registered() {
        let registry = AdapterRegistry::with_builtins(reqwest::Client::new());
        assert_eq!(
            registry.names(),
            vec!["azure", "gemini", "mistral", "ollama", "openai"]
        );
        assert!(registry.contains("OpenAI"));
        assert!(!registry.contains("claude"));
    }

    #[test]
    fn test_templates_register_generic_adapters() {
        let config = Config::from_str(
            r#"
[server]
host = "127.0.0.1"
port = 8080

[templates.Cohere]
api_url = "https://api.cohere.example/v1/chat"
payload = { model = "{model}", message = "{prompt}" }

[templates.openai]
api_url = "https://ignored.example"
"#,
        )
        .unwrap();

        let registry = AdapterRegistry::from_config(&config, reqwest::Client::new());
        assert!(registry.contains("cohere"));
        assert!(registry.contains("claude"));

        let cohere = registry.get("cohere").unwrap();
        assert_eq!(
            cohere.default_endpoint(),
            Some("https://api.cohere.example/v1/chat")
        );

        // Native adapter wins over a template of the same name
        let openai = registry.get("openai").unwrap();
        assert_eq!(openai.default_endpoint(), Some("https://api.openai.com/v1"));
    }
}
