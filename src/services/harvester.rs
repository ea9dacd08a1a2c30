// src/services/harvester.rs
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use log::{debug, error, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::models::{RawTickerFields, UniverseSnapshot};

use super::cache::{get_json, put_json, CacheStore};
use super::valuation::{value_ticker, GrahamParams};

/// Well-known key of the published universe in the shared result cache.
pub const UNIVERSE_KEY: &str = "magic_formula_main_data";
const LISTING_KEY: &str = "stocks_info";

/// Where raw fundamentals come from.
#[async_trait]
pub trait TickerSource: Send + Sync {
    /// The full list of tickers with whatever fields the listing carries.
    async fn fetch_universe(&self) -> Result<Vec<RawTickerFields>>;

    /// Page fields for one ticker.
    async fn fetch_raw_fields(&self, ticker: &str) -> Result<RawTickerFields>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HarvestStats {
    pub requested: usize,
    pub succeeded: usize,
    pub failed: usize,
}

pub struct Harvester {
    source: Arc<dyn TickerSource>,
    scrape_cache: Arc<dyn CacheStore>,
    parallel_requests: usize,
    scrape_ttl: Duration,
    fetch_timeout: Duration,
    batch_pause: Duration,
}

impl Harvester {
    pub fn new(
        config: &AppConfig,
        source: Arc<dyn TickerSource>,
        scrape_cache: Arc<dyn CacheStore>,
    ) -> Self {
        Self {
            source,
            scrape_cache,
            parallel_requests: config.parallel_requests,
            scrape_ttl: config.scrape_cache_ttl,
            fetch_timeout: config.fetch_timeout,
            batch_pause: config.batch_pause,
        }
    }

    /// Reads `key` from the scrape cache, falling back to `fetch` on a miss
    /// and storing what it returns. Cache errors only cost the optimisation.
    async fn cached_or_fetch<T, F>(&self, key: &str, fetch: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: Future<Output = Result<T>>,
    {
        match get_json::<T>(self.scrape_cache.as_ref(), key).await {
            Ok(Some(value)) => {
                debug!("Scrape cache hit for {}", key);
                return Ok(value);
            }
            Ok(None) => {}
            Err(e) => warn!("Scrape cache read failed for {}: {}", key, e),
        }

        let value = fetch.await?;
        if let Err(e) = put_json(self.scrape_cache.as_ref(), key, &value, Some(self.scrape_ttl)).await {
            warn!("Scrape cache write failed for {}: {}", key, e);
        }
        Ok(value)
    }

    pub async fn fetch_universe(&self) -> Result<Vec<RawTickerFields>> {
        self.cached_or_fetch(LISTING_KEY, self.source.fetch_universe())
            .await
            .context("failed to fetch ticker universe")
    }

    /// Listing entry merged with page fields, bounded by the fetch timeout.
    async fn process_ticker(&self, mut listing: RawTickerFields) -> Result<RawTickerFields> {
        let ticker = listing.text("ticker");
        info!("Starting process for ticker {}", ticker);

        let key = format!("page_info_{}", ticker);
        let page = tokio::time::timeout(
            self.fetch_timeout,
            self.cached_or_fetch(&key, self.source.fetch_raw_fields(&ticker)),
        )
        .await
        .map_err(|_| anyhow!("timed out after {:?}", self.fetch_timeout))??;

        listing.merge(page);
        info!("Finishing process for ticker {}", ticker);
        Ok(listing)
    }

    /// Fetches every ticker in batches of `parallel_requests + 1`, pausing
    /// between batches. Failed tickers are logged and left out.
    pub async fn harvest(&self, universe: Vec<RawTickerFields>) -> (Vec<RawTickerFields>, HarvestStats) {
        let mut stats = HarvestStats {
            requested: universe.len(),
            ..HarvestStats::default()
        };
        let batch_size = self.parallel_requests + 1;
        let mut harvested = Vec::with_capacity(universe.len());

        let mut pending = universe.into_iter().peekable();
        while pending.peek().is_some() {
            let batch: Vec<RawTickerFields> = pending.by_ref().take(batch_size).collect();
            let tickers: Vec<String> = batch.iter().map(|f| f.text("ticker")).collect();

            let results = join_all(batch.into_iter().map(|fields| self.process_ticker(fields))).await;
            for (ticker, result) in tickers.iter().zip(results) {
                match result {
                    Ok(fields) => {
                        harvested.push(fields);
                        stats.succeeded += 1;
                    }
                    Err(e) => {
                        error!("Failed to process ticker {}: {:#}", ticker, e);
                        stats.failed += 1;
                    }
                }
            }

            if pending.peek().is_some() && !self.batch_pause.is_zero() {
                tokio::time::sleep(self.batch_pause).await;
            }
        }

        (harvested, stats)
    }

    /// One full cycle: listing, pages, valuation, publication under
    /// [`UNIVERSE_KEY`] with no expiry.
    pub async fn refresh_universe(&self, result_cache: &dyn CacheStore) -> Result<HarvestStats> {
        info!("Processing stock information");
        let universe = self.fetch_universe().await?;
        if universe.is_empty() {
            return Err(anyhow!("ticker listing is empty, keeping previous snapshot"));
        }
        let (harvested, stats) = self.harvest(universe).await;
        if stats.succeeded == 0 {
            return Err(anyhow!("all {} tickers failed, keeping previous snapshot", stats.requested));
        }

        let params = GrahamParams::default();
        let snapshot = UniverseSnapshot {
            generated_at: Utc::now(),
            records: harvested.iter().map(|fields| value_ticker(fields, params)).collect(),
        };

        info!("Writing {} records into result cache", snapshot.records.len());
        put_json(result_cache, UNIVERSE_KEY, &snapshot, None)
            .await
            .context("failed to publish universe snapshot")?;

        info!(
            "Harvest finished: {} requested, {} succeeded, {} failed",
            stats.requested, stats.succeeded, stats.failed
        );
        Ok(stats)
    }
}
