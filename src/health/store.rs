//! Key-value backends for health records
//!
//! Values are opaque JSON strings; expiry is per key. `RedisStore` shares
//! state across gateway instances, `MemoryStore` is the per-process fallback
//! and the test double.

use crate::error::StoreError;
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Minimal key-value contract the health cache needs
#[async_trait]
pub trait HealthStore: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key`, expiring after `ttl`
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// All live keys starting with `prefix`
    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// In-process store with per-key expiry on the tokio clock
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut HashMap<String, (String, Instant)>) -> T) -> T {
        let mut guard = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

#[async_trait]
impl HealthStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        Ok(self.with_entries(|entries| match entries.get(key) {
            Some((value, expires_at)) if *expires_at > now => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let expires_at = Instant::now() + ttl;
        self.with_entries(|entries| {
            entries.insert(key.to_string(), (value.to_string(), expires_at));
        });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.with_entries(|entries| {
            entries.remove(key);
        });
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let now = Instant::now();
        Ok(self.with_entries(|entries| {
            entries.retain(|_, (_, expires_at)| *expires_at > now);
            let mut keys: Vec<String> = entries
                .keys()
                .filter(|key| key.starts_with(prefix))
                .cloned()
                .collect();
            keys.sort();
            keys
        }))
    }
}

/// Redis-backed store shared by every gateway instance
///
/// The multiplexed connection is opened lazily and dropped after any failed
/// command, so the next call reconnects once Redis is back.
pub struct RedisStore {
    client: redis::Client,
    connection: Mutex<Option<MultiplexedConnection>>,
    op_timeout: Duration,
}

impl RedisStore {
    /// Validate the URL; no connection is made until the first command
    pub fn new(url: &str, op_timeout: Duration) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            client,
            connection: Mutex::new(None),
            op_timeout,
        })
    }

    fn cached_connection(&self) -> Option<MultiplexedConnection> {
        match self.connection.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn store_connection(&self, connection: Option<MultiplexedConnection>) {
        match self.connection.lock() {
            Ok(mut guard) => *guard = connection,
            Err(poisoned) => *poisoned.into_inner() = connection,
        }
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        if let Some(connection) = self.cached_connection() {
            return Ok(connection);
        }

        let connection = tokio::time::timeout(
            self.op_timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| StoreError::Unavailable("connect timed out".to_string()))??;

        self.store_connection(Some(connection.clone()));
        Ok(connection)
    }

    /// Run one command with the operation timeout, resetting the connection on failure
    async fn run<T, F, Fut>(&self, op: F) -> Result<T, StoreError>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: Future<Output = redis::RedisResult<T>>,
    {
        let connection = self.connection().await?;
        let result = match tokio::time::timeout(self.op_timeout, op(connection)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(StoreError::from(e)),
            Err(_) => Err(StoreError::Unavailable("command timed out".to_string())),
        };

        if result.is_err() {
            self.store_connection(None);
        }
        result
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("op_timeout", &self.op_timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl HealthStore for RedisStore {
    fn name(&self) -> &str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let key = key.to_string();
        self.run(|mut conn| async move { conn.get::<_, Option<String>>(key).await })
            .await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let key = key.to_string();
        let value = value.to_string();
        let seconds = ttl.as_secs().max(1);
        self.run(|mut conn| async move { conn.set_ex::<_, _, ()>(key, value, seconds).await })
            .await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let key = key.to_string();
        self.run(|mut conn| async move { conn.del::<_, ()>(key).await })
            .await
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let pattern = format!("{}*", prefix);
        let mut keys = self
            .run(|mut conn| async move { conn.keys::<_, Vec<String>>(pattern).await })
            .await?;
        keys.sort();
        Ok(keys)
    }
}
