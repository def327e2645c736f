//! TTL-based provider health cache
//!
//! Records live in a shared store under `provider_health:<provider>:<key>`
//! so every gateway instance converges on the same view. When the shared
//! store fails, reads and writes fall back to an in-process map until it
//! answers again; each transition is logged once.

use super::store::{HealthStore, MemoryStore, RedisStore};
use super::{HealthError, HealthRecord, HealthStatus};
use crate::config::HealthConfig;
use crate::error::StoreError;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Namespace of health keys in the shared store
pub const KEY_PREFIX: &str = "provider_health:";

pub struct HealthCache {
    primary: Option<Arc<dyn HealthStore>>,
    fallback: MemoryStore,
    ttl: Duration,
    degraded: AtomicBool,
}

impl HealthCache {
    /// Cache over an optional shared store
    pub fn new(primary: Option<Arc<dyn HealthStore>>, ttl: Duration) -> Self {
        Self {
            primary,
            fallback: MemoryStore::new(),
            ttl,
            degraded: AtomicBool::new(false),
        }
    }

    /// Per-process cache with no shared store
    pub fn in_memory(ttl: Duration) -> Self {
        Self::new(None, ttl)
    }

    /// Build from `[health]`; a bad Redis URL degrades to in-process tracking
    pub fn from_config(config: &HealthConfig) -> Self {
        let primary: Option<Arc<dyn HealthStore>> = match config.redis_url.as_deref() {
            Some(url) => match RedisStore::new(url, config.connect_timeout()) {
                Ok(store) => {
                    tracing::info!("Health cache using shared Redis store");
                    Some(Arc::new(store))
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "Invalid Redis URL, health tracking is per-instance only"
                    );
                    None
                }
            },
            None => {
                tracing::info!("No shared store configured, health tracking is per-instance");
                None
            }
        };
        Self::new(primary, config.ttl())
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// True while the shared store is failing and the local map is in use
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Store key for a provider and instance-qualified model
    pub fn store_key(provider: &str, key: &str) -> String {
        format!("{}{}:{}", KEY_PREFIX, provider, key)
    }

    fn mark_primary_ok(&self, store: &dyn HealthStore) {
        if self.degraded.swap(false, Ordering::Relaxed) {
            tracing::info!(
                store = %store.name(),
                "Shared health store recovered, cluster-wide health tracking resumed"
            );
        }
    }

    fn mark_primary_failed(&self, store: &dyn HealthStore, error: &StoreError) {
        if !self.degraded.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                store = %store.name(),
                error = %error,
                "Shared health store unavailable, falling back to per-instance health tracking"
            );
        }
    }

    async fn get_raw(&self, key: &str) -> Option<String> {
        if let Some(primary) = &self.primary {
            match primary.get(key).await {
                Ok(value) => {
                    self.mark_primary_ok(primary.as_ref());
                    return value;
                }
                Err(e) => self.mark_primary_failed(primary.as_ref(), &e),
            }
        }
        self.fallback.get(key).await.ok().flatten()
    }

    async fn set_raw(&self, key: &str, value: &str) {
        if let Some(primary) = &self.primary {
            match primary.set_ex(key, value, self.ttl).await {
                Ok(()) => {
                    self.mark_primary_ok(primary.as_ref());
                    return;
                }
                Err(e) => self.mark_primary_failed(primary.as_ref(), &e),
            }
        }
        let _ = self.fallback.set_ex(key, value, self.ttl).await;
    }

    async fn delete_raw(&self, key: &str) {
        if let Some(primary) = &self.primary {
            match primary.delete(key).await {
                Ok(()) => self.mark_primary_ok(primary.as_ref()),
                Err(e) => self.mark_primary_failed(primary.as_ref(), &e),
            }
        }
        // Local copies may exist from an earlier outage
        let _ = self.fallback.delete(key).await;
    }

    async fn keys_raw(&self) -> Vec<String> {
        if let Some(primary) = &self.primary {
            match primary.keys(KEY_PREFIX).await {
                Ok(keys) => {
                    self.mark_primary_ok(primary.as_ref());
                    return keys;
                }
                Err(e) => self.mark_primary_failed(primary.as_ref(), &e),
            }
        }
        self.fallback.keys(KEY_PREFIX).await.unwrap_or_default()
    }

    fn decode(&self, store_key: &str, raw: &str) -> Option<HealthRecord> {
        let record: HealthRecord = match serde_json::from_str(raw) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(key = %store_key, error = %e, "Discarding undecodable health record");
                return None;
            }
        };

        if record.is_expired(self.ttl, Utc::now()) {
            return None;
        }
        Some(record)
    }

    /// Cached record, or None when absent or older than the TTL
    pub async fn get(&self, provider: &str, key: &str) -> Option<HealthRecord> {
        let store_key = Self::store_key(provider, key);
        let raw = self.get_raw(&store_key).await?;
        self.decode(&store_key, &raw)
    }

    /// Overwrite the record for a key, stamped now
    pub async fn set(
        &self,
        provider: &str,
        key: &str,
        status: HealthStatus,
        response_time_ms: Option<u64>,
        error: Option<HealthError>,
    ) -> HealthRecord {
        let record = HealthRecord::new(provider, key, status, response_time_ms, error);
        self.put(&record).await;
        record
    }

    /// Write a prebuilt record
    pub async fn put(&self, record: &HealthRecord) {
        let store_key = Self::store_key(&record.provider, &record.model);
        match serde_json::to_string(record) {
            Ok(raw) => {
                self.set_raw(&store_key, &raw).await;
                tracing::debug!(
                    provider = %record.provider,
                    model = %record.model,
                    status = %record.status.as_str(),
                    "Health record updated"
                );
            }
            Err(e) => {
                tracing::error!(key = %store_key, error = %e, "Failed to encode health record");
            }
        }
    }

    /// Remove a record so the next probe cycle re-establishes it
    pub async fn invalidate(&self, provider: &str, key: &str) {
        let store_key = Self::store_key(provider, key);
        self.delete_raw(&store_key).await;
        tracing::debug!(provider = %provider, key = %key, "Health record invalidated");
    }

    /// Every live record keyed by `provider:instance`
    pub async fn all_health(&self) -> BTreeMap<String, HealthRecord> {
        let mut all = BTreeMap::new();
        for store_key in self.keys_raw().await {
            let Some(raw) = self.get_raw(&store_key).await else {
                continue;
            };
            if let Some(record) = self.decode(&store_key, &raw) {
                all.insert(format!("{}:{}", record.provider, record.model), record);
            }
        }
        all
    }

    /// Remove every health record; returns how many were removed
    pub async fn clear(&self) -> usize {
        let keys = self.keys_raw().await;
        for key in &keys {
            self.delete_raw(key).await;
        }
        tracing::info!(cleared = keys.len(), "Health cache cleared");
        keys.len()
    }
}

impl std::fmt::Debug for HealthCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthCache")
            .field("primary", &self.primary.as_ref().map(|s| s.name().to_string()))
            .field("ttl", &self.ttl)
            .field("degraded", &self.is_degraded())
            .finish()
    }
}
