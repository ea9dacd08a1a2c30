// src/services/redis_cache.rs
use async_trait::async_trait;
use log::{info, warn};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tokio::sync::RwLock;

use super::cache::{resolve_entry, CacheEntry, CacheError, CacheStore};

/// Shared result cache backed by Redis. Each value is one key written with a
/// single `SET`, so concurrent readers see either the old or the new blob.
pub struct RedisCache {
    client: redis::Client,
    conn: RwLock<Option<ConnectionManager>>,
}

impl RedisCache {
    /// Validates the URL only; the connection is opened on first use so an
    /// unreachable server surfaces as `CacheError::Unavailable` per call.
    pub fn new(url: &str) -> Result<Self, CacheError> {
        let client =
            redis::Client::open(url).map_err(|e| CacheError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            conn: RwLock::new(None),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        if let Some(conn) = self.conn.read().await.as_ref() {
            return Ok(conn.clone());
        }

        let mut slot = self.conn.write().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self
            .client
            .get_connection_manager()
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        info!("Connected to result cache");
        *slot = Some(conn.clone());
        Ok(conn)
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.connection().await?;
        let raw: Option<Vec<u8>> = conn
            .get(key)
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        let Some(raw) = raw else {
            return Ok(None);
        };

        let (payload, should_delete) = resolve_entry(key, &raw);
        if should_delete {
            if let Err(e) = conn.del::<_, ()>(key).await {
                warn!("Failed to delete stale result cache key {}: {}", key, e);
            }
        }
        Ok(payload)
    }

    async fn put(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), CacheError> {
        let encoded = CacheEntry::new(value, ttl).encode()?;
        let mut conn = self.connection().await?;
        let result = match ttl {
            Some(ttl) => {
                conn.pset_ex::<_, _, ()>(key, encoded, ttl.as_millis().max(1) as u64)
                    .await
            }
            None => conn.set::<_, _, ()>(key, encoded).await,
        };
        result.map_err(|e| CacheError::Unavailable(e.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))
    }
}
