//! Integration tests for the health cache
//!
//! Records expire after the TTL, keys are instance-qualified, and a failing
//! shared store degrades to the local map instead of losing writes.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tailgate::error::StoreError;
use tailgate::health::{
    ErrorType, HealthCache, HealthError, HealthStatus, HealthStore, MemoryStore,
};
use tailgate::routing::{CandidateExtra, ProviderCandidate, ProviderKind};

#[tokio::test(start_paused = true)]
async fn test_record_present_then_absent_after_ttl() {
    let cache = HealthCache::new(
        Some(Arc::new(MemoryStore::new())),
        Duration::from_secs(300),
    );
    cache
        .set("openai", "gpt-4o", HealthStatus::Healthy, Some(120), None)
        .await;

    let record = cache.get("openai", "gpt-4o").await.unwrap();
    assert_eq!(record.status, HealthStatus::Healthy);
    assert_eq!(record.response_time_ms, Some(120));

    tokio::time::advance(Duration::from_secs(299)).await;
    assert!(cache.get("openai", "gpt-4o").await.is_some());

    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(cache.get("openai", "gpt-4o").await.is_none());
    assert!(cache.all_health().await.is_empty());
}

#[tokio::test]
async fn test_set_overwrites_unconditionally() {
    let cache = HealthCache::in_memory(Duration::from_secs(300));
    cache
        .set("ollama", "llama3", HealthStatus::Healthy, Some(5), None)
        .await;
    cache
        .set(
            "ollama",
            "llama3",
            HealthStatus::Unhealthy,
            Some(5),
            Some(HealthError::new(ErrorType::Connection, "refused")),
        )
        .await;

    let record = cache.get("ollama", "llama3").await.unwrap();
    assert_eq!(record.status, HealthStatus::Unhealthy);
    assert_eq!(record.error_type, ErrorType::Connection);
    assert_eq!(record.response_time_ms, None);
}

#[tokio::test]
async fn test_instances_of_one_model_have_separate_entries() {
    let cache = HealthCache::in_memory(Duration::from_secs(300));
    let first = ProviderCandidate::new(ProviderKind::Mistral, "mistral")
        .with_api_url("http://10.0.0.1:11434/api/generate");
    let second = ProviderCandidate::new(ProviderKind::Mistral, "mistral").with_extra(
        CandidateExtra {
            instance_id: Some("gpu-2".to_string()),
            ..CandidateExtra::default()
        },
    );

    for (candidate, status) in [
        (&first, HealthStatus::Healthy),
        (&second, HealthStatus::Unhealthy),
    ] {
        cache
            .set(
                candidate.provider().as_str(),
                &candidate.instance_qualified_model(),
                status,
                None,
                None,
            )
            .await;
    }

    let all = cache.all_health().await;
    assert_eq!(
        all.keys().cloned().collect::<Vec<_>>(),
        vec!["mistral:mistral:11434", "mistral:mistral@gpu-2"]
    );
    assert_eq!(all["mistral:mistral@gpu-2"].status, HealthStatus::Unhealthy);
}

#[tokio::test]
async fn test_invalidate_and_clear() {
    let cache = HealthCache::in_memory(Duration::from_secs(300));
    cache
        .set("openai", "gpt-4o", HealthStatus::Healthy, Some(1), None)
        .await;
    cache
        .set("gemini", "gemini-pro", HealthStatus::Healthy, Some(1), None)
        .await;

    cache.invalidate("openai", "gpt-4o").await;
    assert!(cache.get("openai", "gpt-4o").await.is_none());
    assert!(cache.get("gemini", "gemini-pro").await.is_some());

    assert_eq!(cache.clear().await, 1);
    assert!(cache.all_health().await.is_empty());
}

/// Shared store that can be switched off and on
struct SwitchableStore {
    inner: MemoryStore,
    down: AtomicBool,
}

impl SwitchableStore {
    fn check(&self) -> Result<(), StoreError> {
        if self.down.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl HealthStore for SwitchableStore {
    fn name(&self) -> &str {
        "switchable"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.check()?;
        self.inner.set_ex(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.check()?;
        self.inner.delete(key).await
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.check()?;
        self.inner.keys(prefix).await
    }
}

#[tokio::test]
async fn test_shared_store_outage_degrades_to_local_map() {
    let store = Arc::new(SwitchableStore {
        inner: MemoryStore::new(),
        down: AtomicBool::new(true),
    });
    let cache = HealthCache::new(Some(store.clone()), Duration::from_secs(300));

    cache
        .set("openai", "gpt-4o", HealthStatus::Healthy, Some(9), None)
        .await;
    assert!(cache.is_degraded());
    assert!(cache.get("openai", "gpt-4o").await.is_some());

    store.down.store(false, Ordering::SeqCst);
    cache
        .set("openai", "gpt-4o", HealthStatus::Unhealthy, None, None)
        .await;
    assert!(!cache.is_degraded());
    assert_eq!(
        cache.get("openai", "gpt-4o").await.unwrap().status,
        HealthStatus::Unhealthy
    );
}
