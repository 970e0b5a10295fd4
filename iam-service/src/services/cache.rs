//! Key-value caching with TTL.
//!
//! `CacheStore` is the untyped string store (Redis or in-process).
//! `TypedCache<T>` layers JSON encoding and a key namespace on top, so a
//! value that fails to decode surfaces as `CacheError::Decode` rather than
//! being silently dropped.

use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::models::Identity;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(#[from] redis::RedisError),

    #[error("cache store unavailable: {0}")]
    Unavailable(String),

    #[error("cached value could not be encoded: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("cached value could not be decoded: {0}")]
    Decode(#[source] serde_json::Error),
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;
    async fn health_check(&self) -> Result<(), CacheError>;
}

/// Process-local cache store bounded by entry count.
///
/// Each entry expires after the TTL it was written with; overwriting a key
/// restarts its clock. Once full, the least valuable entries are evicted.
#[derive(Clone)]
pub struct InMemoryCacheStore {
    entries: Cache<String, StoredValue>,
}

#[derive(Clone)]
struct StoredValue {
    raw: String,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, StoredValue> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StoredValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoredValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

impl InMemoryCacheStore {
    pub fn new(max_entries: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(PerEntryTtl)
            .build();

        Self { entries }
    }

    /// True when `key` holds a live entry.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of live entries, after pending evictions have been applied.
    pub async fn entry_count(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.entries.get(key).await.map(|value| value.raw))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.entries
            .insert(
                key.to_string(),
                StoredValue {
                    raw: value.to_string(),
                    ttl,
                },
            )
            .await;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

/// JSON-encoded values of one type under a fixed key prefix.
pub struct TypedCache<T> {
    store: Arc<dyn CacheStore>,
    prefix: String,
    ttl: Duration,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for TypedCache<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            prefix: self.prefix.clone(),
            ttl: self.ttl,
            _marker: PhantomData,
        }
    }
}

impl<T> TypedCache<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(store: Arc<dyn CacheStore>, prefix: impl Into<String>, ttl: Duration) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            ttl,
            _marker: PhantomData,
        }
    }

    pub fn key(&self, id: &str) -> String {
        format!("{}{}", self.prefix, id)
    }

    pub async fn get(&self, id: &str) -> Result<Option<T>, CacheError> {
        match self.store.get(&self.key(id)).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(CacheError::Decode),
            None => Ok(None),
        }
    }

    pub async fn set(&self, id: &str, value: &T) -> Result<(), CacheError> {
        let raw = serde_json::to_string(value).map_err(CacheError::Encode)?;
        self.store.set(&self.key(id), &raw, self.ttl).await
    }

    pub async fn health_check(&self) -> Result<(), CacheError> {
        self.store.health_check().await
    }
}

/// Resolved identities keyed by the SHA-256 hash of the bearer token.
pub type IdentityCache = TypedCache<Identity>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Entry {
        name: String,
    }

    fn cache(store: Arc<InMemoryCacheStore>, ttl: Duration) -> TypedCache<Entry> {
        TypedCache::new(store, "test:", ttl)
    }

    #[tokio::test]
    async fn values_are_namespaced_and_typed() {
        let store = Arc::new(InMemoryCacheStore::new(100));
        let cache = cache(store.clone(), Duration::from_secs(60));

        cache
            .set("abc", &Entry { name: "ann".to_string() })
            .await
            .unwrap();

        assert!(store.contains_key("test:abc"));
        assert_eq!(
            cache.get("abc").await.unwrap(),
            Some(Entry { name: "ann".to_string() })
        );
        assert_eq!(cache.get("other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let store = Arc::new(InMemoryCacheStore::new(100));
        let cache = cache(store.clone(), Duration::from_millis(20));

        cache
            .set("abc", &Entry { name: "ann".to_string() })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(cache.get("abc").await.unwrap(), None);
        assert_eq!(store.entry_count().await, 0);
    }

    #[tokio::test]
    async fn expired_entries_are_reclaimed_without_being_read() {
        let store = InMemoryCacheStore::new(100_000);
        for i in 0..200 {
            store
                .set(&format!("stale:{i}"), "x", Duration::from_millis(1))
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        for i in 0..10 {
            store
                .set(&format!("live:{i}"), "x", Duration::from_secs(60))
                .await
                .unwrap();
        }

        assert_eq!(store.entry_count().await, 10);
        assert!(store.contains_key("live:0"));
        assert!(!store.contains_key("stale:0"));
    }

    #[tokio::test]
    async fn capacity_bounds_the_store() {
        let store = InMemoryCacheStore::new(50);
        for i in 0..500 {
            store
                .set(&format!("key:{i}"), "x", Duration::from_secs(60))
                .await
                .unwrap();
        }

        assert!(store.entry_count().await <= 50);
    }

    #[tokio::test]
    async fn overwrite_restarts_the_ttl() {
        let store = InMemoryCacheStore::new(100);
        store
            .set("key", "old", Duration::from_millis(20))
            .await
            .unwrap();
        store
            .set("key", "new", Duration::from_secs(60))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(store.get("key").await.unwrap().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn undecodable_value_is_an_explicit_error() {
        let store = Arc::new(InMemoryCacheStore::new(100));
        store
            .set("test:abc", "not json", Duration::from_secs(60))
            .await
            .unwrap();

        let result = cache(store, Duration::from_secs(60)).get("abc").await;
        assert!(matches!(result, Err(CacheError::Decode(_))));
    }
}
