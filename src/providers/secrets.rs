//! Secret lookup for provider credentials
//!
//! Consulted only when no key is configured on the candidate, the provider
//! section or the global defaults.

use crate::error::SecretError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// A source of named secrets (environment, vault, ...)
#[async_trait]
pub trait SecretProvider: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(None)` when the secret is simply not present
    async fn get_secret(&self, name: &str) -> Result<Option<String>, SecretError>;
}

/// Reads secrets from process environment variables
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSecretProvider;

#[async_trait]
impl SecretProvider for EnvSecretProvider {
    fn name(&self) -> &str {
        "env"
    }

    async fn get_secret(&self, name: &str) -> Result<Option<String>, SecretError> {
        match std::env::var(name) {
            Ok(value) => Ok(Some(value)),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::InvalidValue {
                name: name.to_string(),
            }),
        }
    }
}

/// Ordered list of secret providers; the first non-empty value wins
#[derive(Clone, Default)]
pub struct SecretChain {
    providers: Vec<Arc<dyn SecretProvider>>,
}

impl SecretChain {
    pub fn new(providers: Vec<Arc<dyn SecretProvider>>) -> Self {
        Self { providers }
    }

    /// Chain containing only the environment provider
    pub fn from_env() -> Self {
        Self::new(vec![Arc::new(EnvSecretProvider)])
    }

    pub fn push(&mut self, provider: Arc<dyn SecretProvider>) {
        self.providers.push(provider);
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Look a secret up; backend errors are logged and count as "not found"
    pub async fn lookup(&self, name: &str) -> Option<String> {
        for provider in &self.providers {
            match provider.get_secret(name).await {
                Ok(Some(value)) if !value.trim().is_empty() => {
                    tracing::debug!(
                        secret = %name,
                        source = %provider.name(),
                        "Resolved secret"
                    );
                    return Some(value);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        secret = %name,
                        source = %provider.name(),
                        error = %e,
                        "Secret lookup failed, trying next provider"
                    );
                }
            }
        }
        None
    }
}

impl fmt::Debug for SecretChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.providers.iter().map(|p| p.name()).collect();
        f.debug_struct("SecretChain").field("providers", &names).finish()
    }
}
