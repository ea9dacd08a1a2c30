// src/handlers/stocks.rs
use chrono::Utc;
use log::{error, info};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use warp::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use warp::reply::{Reply, Response};
use warp::Rejection;

use crate::routes::AppState;
use crate::services::export::{export_filename, to_csv};
use crate::services::screener::{get_ranked_stocks, ScreenerQuery, DEFAULT_MIN_EBIT, DEFAULT_NUMBER_OF_STOCKS};
use crate::services::valuation::GrahamParams;

use super::error::ApiError;

/// Raw query string of `GET /api/v1/stocks`.
#[derive(Debug, Default, Deserialize)]
pub struct StocksParams {
    pub roic_ignore: Option<String>,
    pub indexes: Option<String>,
    pub list_tickers: Option<String>,
    pub min_ebit: Option<f64>,
    pub min_market_cap: Option<f64>,
    pub number_of_stocks: Option<usize>,
    pub graham_max_pl: Option<f64>,
    pub graham_max_pvp: Option<f64>,
    pub format: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Csv,
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or("")
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

impl StocksParams {
    pub fn output_format(&self) -> Result<OutputFormat, ApiError> {
        match self.format.as_deref().map(str::to_lowercase).as_deref() {
            None | Some("json") => Ok(OutputFormat::Json),
            Some("csv") | Some("excel") => Ok(OutputFormat::Csv),
            Some(other) => Err(ApiError::bad_request(format!("unsupported format {:?}", other))),
        }
    }

    pub fn to_query(&self) -> Result<ScreenerQuery, ApiError> {
        let roic_ignore = match self.roic_ignore.as_deref().map(str::to_lowercase).as_deref() {
            None | Some("") | Some("0") | Some("false") => false,
            Some("1") | Some("true") => true,
            Some(other) => {
                return Err(ApiError::bad_request(format!("invalid roic_ignore {:?}", other)))
            }
        };

        let defaults = GrahamParams::default();
        Ok(ScreenerQuery {
            roic_ignore,
            indexes: split_list(self.indexes.as_deref()),
            list_tickers: split_list(self.list_tickers.as_deref()),
            min_ebit: self.min_ebit.unwrap_or(DEFAULT_MIN_EBIT),
            min_market_cap: self.min_market_cap.unwrap_or(0.0),
            number_of_stocks: self.number_of_stocks.unwrap_or(DEFAULT_NUMBER_OF_STOCKS),
            graham: GrahamParams {
                max_pl: self.graham_max_pl.unwrap_or(defaults.max_pl),
                max_pvp: self.graham_max_pvp.unwrap_or(defaults.max_pvp),
            },
        })
    }
}

pub async fn get_stocks(params: StocksParams, state: Arc<AppState>) -> Result<Response, Rejection> {
    let start = Instant::now();
    let ctx = state.next_context();
    info!("[{}] Handling request to get ranked stocks: {:?}", ctx, params);

    let format = params.output_format().map_err(warp::reject::custom)?;
    let query = params.to_query().map_err(warp::reject::custom)?;

    let stocks = get_ranked_stocks(state.result_cache.as_ref(), &query, ctx)
        .await
        .map_err(|e| {
            error!("[{}] Failed to load ranked stocks: {}", ctx, e);
            warp::reject::custom(ApiError::from(e))
        })?;

    let response = match format {
        OutputFormat::Json => warp::reply::json(&stocks).into_response(),
        OutputFormat::Csv => {
            let bytes = to_csv(&stocks).map_err(|e| {
                error!("[{}] Failed to build export: {}", ctx, e);
                warp::reject::custom(ApiError::new(e.to_string()))
            })?;
            let disposition = format!("attachment; filename=\"{}\"", export_filename(Utc::now()));
            let reply = warp::reply::with_header(bytes, CONTENT_TYPE, "text/csv");
            warp::reply::with_header(reply, CONTENT_DISPOSITION, disposition).into_response()
        }
    };

    info!("[{}] Finished in {} ms", ctx, start.elapsed().as_millis());
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_screener_defaults() {
        let query = StocksParams::default().to_query().unwrap();
        assert_eq!(query, ScreenerQuery::default());
    }

    #[test]
    fn parses_lists_and_flags() {
        let params = StocksParams {
            roic_ignore: Some("1".into()),
            indexes: Some("ibov, smll,".into()),
            list_tickers: Some("vale3".into()),
            number_of_stocks: Some(0),
            graham_max_pl: Some(22.5),
            ..StocksParams::default()
        };
        let query = params.to_query().unwrap();
        assert!(query.roic_ignore);
        assert_eq!(query.indexes, vec!["IBOV".to_string(), "SMLL".to_string()]);
        assert_eq!(query.list_tickers, vec!["VALE3".to_string()]);
        assert_eq!(query.number_of_stocks, 0);
        assert_eq!(query.graham, GrahamParams { max_pl: 22.5, max_pvp: 1.5 });
    }

    #[test]
    fn rejects_unknown_values() {
        let bad_flag = StocksParams {
            roic_ignore: Some("sometimes".into()),
            ..StocksParams::default()
        };
        assert!(bad_flag.to_query().is_err());

        let bad_format = StocksParams {
            format: Some("xml".into()),
            ..StocksParams::default()
        };
        assert!(bad_format.output_format().is_err());
        let excel = StocksParams {
            format: Some("Excel".into()),
            ..StocksParams::default()
        };
        assert_eq!(excel.output_format().unwrap(), OutputFormat::Csv);
    }
}
