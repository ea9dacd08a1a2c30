// src/config.rs
use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Settings read once at startup and handed to the components that need them.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub parallel_requests: usize,
    pub use_cache: bool,
    pub scrape_cache_ttl: Duration,
    pub refresh_interval: Duration,
    pub fetch_timeout: Duration,
    pub batch_pause: Duration,
    pub cache_dir: PathBuf,
    pub result_cache_dir: PathBuf,
    /// Redis URL for the shared result cache; `None` uses `result_cache_dir`.
    pub result_cache_url: Option<String>,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            parallel_requests: 6,
            use_cache: false,
            scrape_cache_ttl: Duration::from_secs(50 * 60),
            refresh_interval: Duration::from_secs(60 * 60),
            fetch_timeout: Duration::from_secs(30),
            batch_pause: Duration::from_millis(100),
            cache_dir: PathBuf::from("cache"),
            result_cache_dir: PathBuf::from("cache/shared"),
            result_cache_url: None,
            port: 3030,
        }
    }
}

impl AppConfig {
    /// Loads `.env` if present, then reads the environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = AppConfig::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Ok(AppConfig {
            parallel_requests: parse_or(get("PARALLEL_REQUESTS"), "PARALLEL_REQUESTS", defaults.parallel_requests)?,
            use_cache: match get("USE_CACHE") {
                Some(v) => parse_flag(&v).with_context(|| format!("USE_CACHE has invalid value {:?}", v))?,
                None => defaults.use_cache,
            },
            scrape_cache_ttl: get("FILE_TTL_MINUTES")
                .map(|v| parse_value::<u64>(&v, "FILE_TTL_MINUTES"))
                .transpose()?
                .map(|m| Duration::from_secs(m * 60))
                .unwrap_or(defaults.scrape_cache_ttl),
            refresh_interval: get("REFRESH_INTERVAL_MINUTES")
                .map(|v| parse_positive(&v, "REFRESH_INTERVAL_MINUTES"))
                .transpose()?
                .map(|m| Duration::from_secs(m * 60))
                .unwrap_or(defaults.refresh_interval),
            fetch_timeout: get("FETCH_TIMEOUT_SECS")
                .map(|v| parse_value::<u64>(&v, "FETCH_TIMEOUT_SECS"))
                .transpose()?
                .map(Duration::from_secs)
                .unwrap_or(defaults.fetch_timeout),
            batch_pause: get("BATCH_PAUSE_MS")
                .map(|v| parse_value::<u64>(&v, "BATCH_PAUSE_MS"))
                .transpose()?
                .map(Duration::from_millis)
                .unwrap_or(defaults.batch_pause),
            cache_dir: get("CACHE_DIR").map(PathBuf::from).unwrap_or(defaults.cache_dir),
            result_cache_dir: get("RESULT_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.result_cache_dir),
            result_cache_url: get("RESULT_CACHE_URL"),
            port: parse_or(get("PORT"), "PORT", defaults.port)?,
        })
    }
}

fn parse_value<T>(raw: &str, key: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse::<T>()
        .with_context(|| format!("{} has invalid value {:?}", key, raw))
}

fn parse_positive(raw: &str, key: &str) -> Result<u64> {
    let value = parse_value::<u64>(raw, key)?;
    if value == 0 {
        anyhow::bail!("{} must be greater than zero", key);
    }
    Ok(value)
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(v) => parse_value(&v, key),
        None => Ok(default),
    }
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("expected a boolean"),
    }
}
