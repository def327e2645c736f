//! Provider routing: chain resolution, endpoint precedence and fallback execution
//!
//! A `RoutingTable` is built once per configuration load. It bundles the
//! resolved `FallbackChain`, the provider-level endpoint settings and the
//! adapter registry. Requests share it read-only through `SharedRouting`,
//! which swaps in a whole new table on reload.

pub mod candidate;
pub mod executor;
pub mod resolver;

pub use candidate::{
    ApiKey, CandidateDef, CandidateExtra, InvalidCandidate, ProviderCandidate, ProviderKind,
};
pub use executor::{FallbackExecutor, Generation};
pub use resolver::resolve;

use crate::config::{Config, ProviderSettings};
use crate::providers::{AdapterRegistry, ProviderAdapter, SecretChain};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Kind of symbolic chain entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    #[default]
    Model,
    InstanceGroup,
    /// Any unrecognized `type`; dropped at resolution
    #[serde(other)]
    Unknown,
}

/// `{ ref, type }` chain entry
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RoutingReference {
    #[serde(rename = "ref")]
    pub target: String,
    #[serde(rename = "type", default)]
    pub kind: ReferenceKind,
}

/// One raw `fallback_chain` entry
///
/// Entries with a `ref` key are references; anything else is a literal
/// candidate definition, validated at resolution.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ChainEntry {
    Reference(RoutingReference),
    Literal(CandidateDef),
}

/// Ordered list of model ids sharing one logical role
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InstanceGroupDef {
    pub id: String,
    #[serde(default)]
    pub models: Vec<String>,
}

/// Ordered, resolved, immutable list of candidates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FallbackChain {
    candidates: Vec<ProviderCandidate>,
}

impl FallbackChain {
    pub fn new(candidates: Vec<ProviderCandidate>) -> Self {
        Self { candidates }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&ProviderCandidate> {
        self.candidates.get(position)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ProviderCandidate> {
        self.candidates.iter()
    }

    pub fn as_slice(&self) -> &[ProviderCandidate] {
        &self.candidates
    }
}

impl<'a> IntoIterator for &'a FallbackChain {
    type Item = &'a ProviderCandidate;
    type IntoIter = std::slice::Iter<'a, ProviderCandidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.candidates.iter()
    }
}

impl From<Vec<ProviderCandidate>> for FallbackChain {
    fn from(candidates: Vec<ProviderCandidate>) -> Self {
        Self::new(candidates)
    }
}

/// Provider-level and global endpoint/credential overrides
///
/// Provider names are normalized to lower case so `[providers.OpenAI]` and
/// `provider = "openai"` meet.
#[derive(Debug, Clone, Default)]
pub struct EndpointSettings {
    providers: HashMap<String, ProviderSettings>,
    defaults: ProviderSettings,
}

impl EndpointSettings {
    pub fn new(providers: HashMap<String, ProviderSettings>, defaults: ProviderSettings) -> Self {
        let providers = providers
            .into_iter()
            .map(|(name, settings)| (name.trim().to_ascii_lowercase(), settings))
            .collect();
        Self {
            providers,
            defaults,
        }
    }

    fn for_provider(&self, provider: &ProviderKind) -> Option<&ProviderSettings> {
        self.providers.get(provider.as_str())
    }

    /// Configured endpoint: candidate, then provider-level, then global
    pub fn configured_url(&self, candidate: &ProviderCandidate) -> Option<String> {
        candidate
            .api_url()
            .map(str::to_string)
            .or_else(|| {
                self.for_provider(candidate.provider())
                    .and_then(|s| s.api_url.clone())
            })
            .or_else(|| self.defaults.api_url.clone())
            .filter(|url| !url.trim().is_empty())
    }

    /// Configured key: candidate, then provider-level, then global
    pub fn configured_key(&self, candidate: &ProviderCandidate) -> Option<ApiKey> {
        candidate
            .api_key()
            .cloned()
            .or_else(|| {
                self.for_provider(candidate.provider())
                    .and_then(|s| s.api_key.clone())
            })
            .or_else(|| self.defaults.api_key.clone())
            .filter(|key| !key.is_placeholder())
    }
}

/// Everything a request needs to walk the chain
#[derive(Debug)]
pub struct RoutingTable {
    chain: FallbackChain,
    endpoints: EndpointSettings,
    adapters: AdapterRegistry,
}

impl RoutingTable {
    pub fn new(chain: FallbackChain, endpoints: EndpointSettings, adapters: AdapterRegistry) -> Self {
        Self {
            chain,
            endpoints,
            adapters,
        }
    }

    /// Resolve the chain and build adapters for a loaded configuration
    pub fn from_config(config: &Config, client: reqwest::Client) -> Self {
        let chain = resolve(&config.routing);
        let endpoints = EndpointSettings::new(config.providers.clone(), config.defaults.clone());
        let adapters = AdapterRegistry::from_config(config, client);
        Self::new(chain, endpoints, adapters)
    }

    pub fn chain(&self) -> &FallbackChain {
        &self.chain
    }

    pub fn endpoints(&self) -> &EndpointSettings {
        &self.endpoints
    }

    pub fn adapters(&self) -> &AdapterRegistry {
        &self.adapters
    }

    /// Adapter serving a candidate's provider, if one is registered
    pub fn adapter_for(&self, candidate: &ProviderCandidate) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(candidate.provider().as_str())
    }

    /// Effective endpoint: configured precedence, then the adapter's built-in default
    pub fn effective_url(&self, candidate: &ProviderCandidate) -> Option<String> {
        self.endpoints.configured_url(candidate).or_else(|| {
            self.adapter_for(candidate)
                .and_then(|adapter| adapter.default_endpoint().map(str::to_string))
        })
    }

    /// Effective credential: configured precedence, then the secret providers
    pub async fn effective_key(
        &self,
        candidate: &ProviderCandidate,
        secrets: &SecretChain,
    ) -> Option<ApiKey> {
        if let Some(key) = self.endpoints.configured_key(candidate) {
            return Some(key);
        }

        let secret_name = self.adapter_for(candidate)?.secret_name()?;
        secrets
            .lookup(&secret_name)
            .await
            .map(ApiKey::new)
            .filter(|key| !key.is_placeholder())
    }
}

/// Current routing table, replaced wholesale on reload
///
/// Readers clone the inner `Arc` and release the lock immediately, so the
/// lock is never held across an await point.
#[derive(Debug)]
pub struct SharedRouting {
    current: RwLock<Arc<RoutingTable>>,
}

impl SharedRouting {
    pub fn new(table: RoutingTable) -> Self {
        Self {
            current: RwLock::new(Arc::new(table)),
        }
    }

    /// Snapshot of the current table for one request
    pub fn snapshot(&self) -> Arc<RoutingTable> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Swap in a new table; in-flight requests keep their snapshot
    pub fn replace(&self, table: RoutingTable) {
        let table = Arc::new(table);
        match self.current.write() {
            Ok(mut guard) => *guard = table,
            Err(poisoned) => *poisoned.into_inner() = table,
        }
    }
}
