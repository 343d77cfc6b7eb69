//! Edge store: the durable layer under the in-process report cache.
//!
//! Values are opaque strings with a TTL. The in-memory store serves single
//! instance deployments and tests; Redis (feature `redis-backend`) lets
//! several instances share one published report.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use picks_common::{StoreBackend, StoreConfig};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{PicksError, PicksResult};

/// Key/value store with get and put-with-TTL.
#[async_trait]
pub trait EdgeStore: Send + Sync {
    /// Backend name for logs and status
    fn backend(&self) -> &'static str;

    /// Value under `key`, `None` when absent or expired.
    async fn get(&self, key: &str) -> PicksResult<Option<String>>;

    async fn put_with_ttl(&self, key: &str, value: String, ttl: Duration) -> PicksResult<()>;
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Debug, Clone)]
struct StoreEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

impl StoreEntry {
    fn new(value: String, ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        Self {
            value,
            expires_at: Utc::now().checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryEdgeStore {
    entries: RwLock<HashMap<String, StoreEntry>>,
}

impl MemoryEdgeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EdgeStore for MemoryEdgeStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> PicksResult<Option<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| PicksError::Store("memory store lock poisoned".into()))?;

        Ok(entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value.clone()))
    }

    async fn put_with_ttl(&self, key: &str, value: String, ttl: Duration) -> PicksResult<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| PicksError::Store("memory store lock poisoned".into()))?;
        // Expired entries are dropped on write.
        entries.retain(|_, entry| !entry.is_expired());
        entries.insert(key.to_string(), StoreEntry::new(value, ttl));
        Ok(())
    }
}

// ============================================================================
// Redis store
// ============================================================================

/// Redis-backed store (SET with EX).
#[cfg(feature = "redis-backend")]
pub struct RedisEdgeStore {
    conn: tokio::sync::Mutex<redis::aio::ConnectionManager>,
}

#[cfg(feature = "redis-backend")]
impl RedisEdgeStore {
    pub async fn connect(url: &str) -> PicksResult<Self> {
        let client = redis::Client::open(url).map_err(|e| PicksError::Store(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| PicksError::Store(e.to_string()))?;
        tracing::info!("Connected to Redis report store");
        Ok(Self {
            conn: tokio::sync::Mutex::new(conn),
        })
    }
}

#[cfg(feature = "redis-backend")]
#[async_trait]
impl EdgeStore for RedisEdgeStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> PicksResult<Option<String>> {
        let mut conn = self.conn.lock().await;
        redis::cmd("GET")
            .arg(key)
            .query_async::<Option<String>>(&mut *conn)
            .await
            .map_err(|e| PicksError::Store(e.to_string()))
    }

    async fn put_with_ttl(&self, key: &str, value: String, ttl: Duration) -> PicksResult<()> {
        let mut conn = self.conn.lock().await;
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<()>(&mut *conn)
            .await
            .map_err(|e| PicksError::Store(e.to_string()))
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Build the configured store.
///
/// Without the `redis-backend` feature a Redis configuration falls back to
/// the in-memory store with a warning.
pub async fn create_store(config: &StoreConfig) -> PicksResult<Arc<dyn EdgeStore>> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryEdgeStore::new())),
        StoreBackend::Redis => redis_store(config).await,
    }
}

#[cfg(feature = "redis-backend")]
async fn redis_store(config: &StoreConfig) -> PicksResult<Arc<dyn EdgeStore>> {
    let url = config
        .redis_url
        .as_deref()
        .ok_or_else(|| PicksError::Store("redis backend selected without redis_url".into()))?;
    Ok(Arc::new(RedisEdgeStore::connect(url).await?))
}

#[cfg(not(feature = "redis-backend"))]
async fn redis_store(_config: &StoreConfig) -> PicksResult<Arc<dyn EdgeStore>> {
    tracing::warn!(
        "Redis backend feature not enabled. Falling back to in-memory report store. \
         Enable with: cargo build --features redis-backend"
    );
    Ok(Arc::new(MemoryEdgeStore::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_put_get() {
        let store = MemoryEdgeStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);

        store
            .put_with_ttl("k", "v".into(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(store.backend(), "memory");
    }

    #[tokio::test]
    async fn test_memory_store_expiry() {
        let store = MemoryEdgeStore::new();
        store
            .put_with_ttl("k", "v".into(), Duration::from_millis(20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("k").await.unwrap(), None);

        store
            .put_with_ttl("other", "w".into(), Duration::from_secs(60))
            .await
            .unwrap();
        let entries = store.entries.read().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries.contains_key("other"));
    }

    #[tokio::test]
    async fn test_factory_defaults_to_memory() {
        let store = create_store(&StoreConfig::default()).await.unwrap();
        assert_eq!(store.backend(), "memory");
    }
}
