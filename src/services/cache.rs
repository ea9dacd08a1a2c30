// src/services/cache.rs
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum CacheError {
    /// The backing store could not be reached at all.
    Unavailable(String),
    /// A value could not be serialized for writing.
    Serialization(String),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CacheError::Unavailable(msg) => write!(f, "cache unavailable: {}", msg),
            CacheError::Serialization(msg) => write!(f, "cache serialization error: {}", msg),
        }
    }
}

impl std::error::Error for CacheError {}

/// Key -> bytes storage with per-entry time to live.
///
/// `get` must treat expired and undecodable entries as absent; only a store
/// that cannot be reached returns `Err`.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// `ttl = None` keeps the value until the next write to `key`.
    async fn put(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct EntryHeader {
    created_at_ms: i64,
    ttl_ms: Option<u64>,
    len: usize,
}

/// A stored value plus the metadata needed to decide freshness.
///
/// On the wire an entry is a JSON header line followed by the raw payload,
/// whose length the header records.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub created_at_ms: i64,
    pub ttl: Option<Duration>,
    pub payload: Vec<u8>,
}

impl CacheEntry {
    pub fn new(payload: &[u8], ttl: Option<Duration>) -> Self {
        Self {
            created_at_ms: Utc::now().timestamp_millis(),
            ttl,
            payload: payload.to_vec(),
        }
    }

    pub fn is_fresh_at(&self, now_ms: i64) -> bool {
        match self.ttl {
            None => true,
            Some(ttl) => now_ms.saturating_sub(self.created_at_ms) < ttl.as_millis() as i64,
        }
    }

    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(Utc::now().timestamp_millis())
    }

    pub fn encode(&self) -> Result<Vec<u8>, CacheError> {
        let header = EntryHeader {
            created_at_ms: self.created_at_ms,
            ttl_ms: self.ttl.map(|ttl| ttl.as_millis() as u64),
            len: self.payload.len(),
        };
        let mut bytes = serde_json::to_vec(&header)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;
        bytes.push(b'\n');
        bytes.extend_from_slice(&self.payload);
        Ok(bytes)
    }

    /// `None` for anything that is not a well-formed entry.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let split = bytes.iter().position(|b| *b == b'\n')?;
        let header: EntryHeader = serde_json::from_slice(&bytes[..split]).ok()?;
        let payload = &bytes[split + 1..];
        if payload.len() != header.len {
            return None;
        }
        Some(Self {
            created_at_ms: header.created_at_ms,
            ttl: header.ttl_ms.map(Duration::from_millis),
            payload: payload.to_vec(),
        })
    }
}

/// Resolves raw stored bytes to a live payload. Returns `(payload, should_delete)`.
pub(crate) fn resolve_entry(key: &str, raw: &[u8]) -> (Option<Vec<u8>>, bool) {
    match CacheEntry::decode(raw) {
        Some(entry) if entry.is_fresh() => (Some(entry.payload), false),
        Some(_) => {
            debug!("Cache entry {} expired", key);
            (None, true)
        }
        None => {
            warn!("Cache entry {} is corrupt, treating as miss", key);
            (None, true)
        }
    }
}

pub async fn get_json<T: DeserializeOwned>(
    store: &dyn CacheStore,
    key: &str,
) -> Result<Option<T>, CacheError> {
    let Some(bytes) = store.get(key).await? else {
        return Ok(None);
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            warn!("Cached value under {} could not be decoded: {}", key, e);
            Ok(None)
        }
    }
}

pub async fn put_json<T: Serialize>(
    store: &dyn CacheStore,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> Result<(), CacheError> {
    let bytes = serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
    store.put(key, &bytes, ttl).await
}

/// In-process store. Used for tests and single-process runs.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores raw bytes without an envelope; only useful to simulate corruption.
    pub fn put_raw(&self, key: &str, bytes: &[u8]) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), bytes.to_vec());
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        let Some(raw) = entries.get(key) else {
            return Ok(None);
        };
        let (payload, should_delete) = resolve_entry(key, raw);
        if should_delete {
            entries.remove(key);
        }
        Ok(payload)
    }

    async fn put(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), CacheError> {
        let encoded = CacheEntry::new(value, ttl).encode()?;
        self.entries
            .lock()
            .map_err(|e| CacheError::Unavailable(e.to_string()))?
            .insert(key.to_string(), encoded);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries
            .lock()
            .map_err(|e| CacheError::Unavailable(e.to_string()))?
            .remove(key);
        Ok(())
    }
}

/// One file per key under a directory. Writes go through a temp file and a
/// rename so a reader never sees a half-written entry.
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.cache", name))
    }
}

#[async_trait]
impl CacheStore for FileCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.path_for(key);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::Unavailable(format!("{}: {}", path.display(), e))),
        };
        let (payload, should_delete) = resolve_entry(key, &raw);
        if should_delete {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!("Failed to remove stale cache file {}: {}", path.display(), e);
            }
        }
        Ok(payload)
    }

    async fn put(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), CacheError> {
        let encoded = CacheEntry::new(value, ttl).encode()?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CacheError::Unavailable(format!("{}: {}", self.dir.display(), e)))?;

        let path = self.path_for(key);
        let tmp = path.with_extension("cache.tmp");
        tokio::fs::write(&tmp, &encoded)
            .await
            .map_err(|e| CacheError::Unavailable(format!("{}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| CacheError::Unavailable(format!("{}: {}", path.display(), e)))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::Unavailable(e.to_string())),
        }
    }
}

/// Stand-in for the scrape cache when caching is switched off.
pub struct DisabledCache;

#[async_trait]
impl CacheStore for DisabledCache {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(None)
    }

    async fn put(&self, _key: &str, _value: &[u8], _ttl: Option<Duration>) -> Result<(), CacheError> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn put_then_get_returns_value() {
        let cache = MemoryCache::new();
        cache.put("k", b"hello", Some(Duration::from_secs(60))).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn put_replaces_previous_value() {
        let cache = MemoryCache::new();
        cache.put("k", b"one", None).await.unwrap();
        cache.put("k", b"two", None).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"two".to_vec()));
    }

    #[tokio::test]
    async fn expired_entry_is_absent_and_removed() {
        let cache = MemoryCache::new();
        cache.put("k", b"v", Some(Duration::from_millis(20))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn corrupt_entry_reads_as_miss() {
        let cache = MemoryCache::new();
        cache.put_raw("k", b"\x80\x04garbage");
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn undecodable_json_reads_as_miss() {
        let cache = MemoryCache::new();
        cache.put("k", b"not json", None).await.unwrap();
        let value: Option<Vec<u32>> = get_json(&cache, "k").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn json_helpers_round_trip() {
        let cache = MemoryCache::new();
        let value = json!({"ticker": "WEGE3", "roic": 21.5});
        put_json(&cache, "w", &value, None).await.unwrap();
        let back: Option<serde_json::Value> = get_json(&cache, "w").await.unwrap();
        assert_eq!(back, Some(value));
    }

    #[test]
    fn freshness_uses_elapsed_time() {
        let entry = CacheEntry {
            created_at_ms: 1_000,
            ttl: Some(Duration::from_secs(1)),
            payload: vec![],
        };
        assert!(entry.is_fresh_at(1_999));
        assert!(!entry.is_fresh_at(2_000));

        let permanent = CacheEntry { ttl: None, ..entry };
        assert!(permanent.is_fresh_at(i64::MAX));
    }

    #[test]
    fn truncated_entry_does_not_decode() {
        let mut bytes = CacheEntry::new(b"payload", None).encode().unwrap();
        bytes.pop();
        assert!(CacheEntry::decode(&bytes).is_none());
    }

    #[tokio::test]
    async fn file_cache_round_trip_and_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());
        cache.put("page_info_VALE3", b"{}", Some(Duration::from_millis(20))).await.unwrap();
        assert_eq!(cache.get("page_info_VALE3").await.unwrap(), Some(b"{}".to_vec()));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cache.get("page_info_VALE3").await.unwrap(), None);
        assert!(!dir.path().join("page_info_VALE3.cache").exists());
    }

    #[tokio::test]
    async fn file_cache_missing_key_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path().join("not-created-yet"));
        assert_eq!(cache.get("nothing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn disabled_cache_never_stores() {
        let cache = DisabledCache;
        cache.put("k", b"v", None).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }
}
