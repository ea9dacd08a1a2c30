// src/services/mod.rs
use log::info;
use std::sync::Arc;

use crate::config::AppConfig;

pub mod cache;
pub mod export;
pub mod harvester;
pub mod ranking;
pub mod redis_cache;
pub mod screener;
pub mod status_invest;
pub mod valuation;

use cache::{CacheError, CacheStore, DisabledCache, FileCache};
use redis_cache::RedisCache;

/// Per-page scrape cache. Disabled unless `USE_CACHE` is set.
pub fn scrape_cache(config: &AppConfig) -> Arc<dyn CacheStore> {
    if config.use_cache {
        info!("Scrape cache enabled at {}", config.cache_dir.display());
        Arc::new(FileCache::new(config.cache_dir.clone()))
    } else {
        info!("Scrape cache disabled");
        Arc::new(DisabledCache)
    }
}

/// Result cache shared by the harvester and the API.
pub fn result_cache(config: &AppConfig) -> Result<Arc<dyn CacheStore>, CacheError> {
    match config.result_cache_url.as_deref() {
        Some(url) => {
            info!("Using redis result cache");
            Ok(Arc::new(RedisCache::new(url)?))
        }
        None => {
            info!("Using file result cache at {}", config.result_cache_dir.display());
            Ok(Arc::new(FileCache::new(config.result_cache_dir.clone())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::cache::{get_json, put_json};

    #[tokio::test]
    async fn disabled_scrape_cache_never_hits() {
        let store = scrape_cache(&AppConfig::default());
        put_json(store.as_ref(), "k", &1u32, None).await.unwrap();
        assert_eq!(get_json::<u32>(store.as_ref(), "k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn file_result_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            result_cache_dir: dir.path().to_path_buf(),
            ..AppConfig::default()
        };
        let store = result_cache(&config).unwrap();
        put_json(store.as_ref(), "k", &7u32, None).await.unwrap();
        assert_eq!(get_json::<u32>(store.as_ref(), "k").await.unwrap(), Some(7));
    }

    #[test]
    fn bad_redis_url_is_rejected() {
        let config = AppConfig {
            result_cache_url: Some("not a url".into()),
            ..AppConfig::default()
        };
        assert!(result_cache(&config).is_err());
    }
}
