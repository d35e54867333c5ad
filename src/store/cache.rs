// src/store/cache.rs

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use dashmap::DashMap;
use redis::{Client, RedisError, aio::ConnectionManager, cmd};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::sync::RwLock;

/// Shared key/value cache with per-entry expiry.
///
/// Every operation is best-effort: backends log their own failures and
/// behave like a miss, so callers never have to handle cache errors.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Value>;
    async fn set(&self, key: &str, value: Value, ttl: Duration);
    async fn delete(&self, key: &str);
}

/// Reads a typed value. Entries that no longer deserialize count as a miss.
pub async fn get_json<T: DeserializeOwned>(cache: &dyn Cache, key: &str) -> Option<T> {
    let value = cache.get(key).await?;
    serde_json::from_value(value)
        .map_err(|e| tracing::warn!("Discarding malformed cache entry {}: {}", key, e))
        .ok()
}

pub async fn set_json<T: Serialize>(cache: &dyn Cache, key: &str, value: &T, ttl: Duration) {
    match serde_json::to_value(value) {
        Ok(value) => cache.set(key, value, ttl).await,
        Err(e) => tracing::warn!("Failed to serialize cache entry {}: {}", key, e),
    }
}

struct Entry {
    value: Value,
    expires_at: Instant,
}

/// In-process cache. Shared across request handlers of one server process.
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<DashMap<String, Entry>>,
}

const PURGE_THRESHOLD: usize = 10_000;

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let hit = self.entries.get(key).and_then(|entry| {
            (entry.expires_at > now).then(|| entry.value.clone())
        });
        if hit.is_none() {
            self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        }
        hit
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) {
        let now = Instant::now();
        if self.entries.len() >= PURGE_THRESHOLD {
            self.entries.retain(|_, entry| entry.expires_at > now);
        }
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
    }

    async fn delete(&self, key: &str) {
        self.entries.remove(key);
    }
}

/// Redis-backed cache for deployments running several server processes.
#[derive(Clone)]
pub struct RedisCache {
    url: String,
    manager: Arc<RwLock<Option<ConnectionManager>>>,
}

impl RedisCache {
    pub fn new(url: String) -> Self {
        Self {
            url,
            manager: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn connect(&self) -> Result<(), RedisError> {
        let client = Client::open(self.url.clone())?;
        let manager = ConnectionManager::new(client).await?;
        let mut guard = self.manager.write().await;
        *guard = Some(manager);
        Ok(())
    }

    async fn connection(&self) -> Option<ConnectionManager> {
        self.manager.read().await.clone()
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Option<Value> {
        let mut manager = self.connection().await?;
        let raw: Option<String> = match cmd("GET").arg(key).query_async(&mut manager).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Cache GET {} failed: {}", key, e);
                return None;
            }
        };
        raw.and_then(|raw| serde_json::from_str(&raw).ok())
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) {
        let Some(mut manager) = self.connection().await else {
            return;
        };
        let result: Result<(), RedisError> = cmd("SET")
            .arg(key)
            .arg(value.to_string())
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut manager)
            .await;
        if let Err(e) = result {
            tracing::warn!("Cache SET {} failed: {}", key, e);
        }
    }

    async fn delete(&self, key: &str) {
        let Some(mut manager) = self.connection().await else {
            return;
        };
        let result: Result<(), RedisError> = cmd("DEL").arg(key).query_async(&mut manager).await;
        if let Err(e) = result {
            tracing::warn!("Cache DEL {} failed: {}", key, e);
        }
    }
}
