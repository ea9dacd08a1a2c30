// src/services/screener.rs
use log::{info, warn};
use std::fmt;

use crate::models::{RankedStock, TickerRecord, UniverseSnapshot};

use super::cache::{get_json, CacheError, CacheStore};
use super::harvester::UNIVERSE_KEY;
use super::ranking::rank_universe;
use super::valuation::{revalue_graham, GrahamParams};

pub const DEFAULT_NUMBER_OF_STOCKS: usize = 150;
pub const DEFAULT_MIN_EBIT: f64 = 1.0;

/// Request-scoped filters and re-ranking parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenerQuery {
    pub roic_ignore: bool,
    /// Empty means unrestricted.
    pub indexes: Vec<String>,
    /// Empty means unrestricted.
    pub list_tickers: Vec<String>,
    pub min_ebit: f64,
    pub min_market_cap: f64,
    /// `0` means no limit.
    pub number_of_stocks: usize,
    pub graham: GrahamParams,
}

impl Default for ScreenerQuery {
    fn default() -> Self {
        ScreenerQuery {
            roic_ignore: false,
            indexes: Vec::new(),
            list_tickers: Vec::new(),
            min_ebit: DEFAULT_MIN_EBIT,
            min_market_cap: 0.0,
            number_of_stocks: DEFAULT_NUMBER_OF_STOCKS,
            graham: GrahamParams::default(),
        }
    }
}

impl ScreenerQuery {
    pub fn accepts(&self, record: &TickerRecord) -> bool {
        if !self.indexes.is_empty() && !record.in_any_index(&self.indexes) {
            return false;
        }
        if !self.list_tickers.is_empty()
            && !self
                .list_tickers
                .iter()
                .any(|t| t.eq_ignore_ascii_case(&record.symbol))
        {
            return false;
        }
        record.ebit >= self.min_ebit && record.market_cap >= self.min_market_cap
    }
}

/// Per-request metadata carried into log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    pub id: u64,
}

impl fmt::Display for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "req-{}", self.id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServeError {
    /// Nothing has been published yet.
    NoData,
    /// The result cache could not be reached.
    Unavailable(String),
}

impl fmt::Display for ServeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ServeError::NoData => write!(f, "No information retrieved from the result cache"),
            ServeError::Unavailable(msg) => write!(f, "Result cache unavailable: {}", msg),
        }
    }
}

impl std::error::Error for ServeError {}

impl From<CacheError> for ServeError {
    fn from(err: CacheError) -> Self {
        ServeError::Unavailable(err.to_string())
    }
}

/// Filters, optionally revalues, ranks and truncates a snapshot.
pub fn screen(snapshot: &UniverseSnapshot, query: &ScreenerQuery) -> Vec<RankedStock> {
    let mut eligible: Vec<TickerRecord> = snapshot
        .records
        .iter()
        .filter(|record| query.accepts(record))
        .cloned()
        .collect();

    if !query.graham.is_default() {
        for record in eligible.iter_mut() {
            revalue_graham(record, query.graham);
        }
    }

    let mut ranked = rank_universe(eligible, query.roic_ignore);
    if query.number_of_stocks > 0 {
        ranked.truncate(query.number_of_stocks);
    }
    ranked
}

pub async fn load_snapshot(store: &dyn CacheStore) -> Result<UniverseSnapshot, ServeError> {
    match get_json::<UniverseSnapshot>(store, UNIVERSE_KEY).await {
        Ok(Some(snapshot)) => Ok(snapshot),
        Ok(None) => Err(ServeError::NoData),
        Err(e) => {
            warn!("Failed to read universe snapshot: {}", e);
            Err(e.into())
        }
    }
}

/// Reads the published universe and applies `query`. An empty `Ok` means the
/// filters matched nothing; a missing or unreachable snapshot is an `Err`.
pub async fn get_ranked_stocks(
    store: &dyn CacheStore,
    query: &ScreenerQuery,
    ctx: RequestContext,
) -> Result<Vec<RankedStock>, ServeError> {
    let snapshot = load_snapshot(store).await?;
    let ranked = screen(&snapshot, query);
    info!(
        "[{}] Ranked {} of {} tickers (snapshot from {})",
        ctx,
        ranked.len(),
        snapshot.records.len(),
        snapshot.generated_at
    );
    Ok(ranked)
}
