// src/routes.rs
use log::info;
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use warp::reject::Rejection;
use warp::{Filter, Reply};

use crate::handlers::error::ApiError;
use crate::handlers::stocks::{get_stocks, StocksParams};
use crate::services::cache::CacheStore;
use crate::services::screener::RequestContext;

/// Shared handler state.
pub struct AppState {
    pub result_cache: Arc<dyn CacheStore>,
    next_request_id: AtomicU64,
}

impl AppState {
    pub fn new(result_cache: Arc<dyn CacheStore>) -> Self {
        AppState {
            result_cache,
            next_request_id: AtomicU64::new(1),
        }
    }

    pub fn next_context(&self) -> RequestContext {
        RequestContext {
            id: self.next_request_id.fetch_add(1, Ordering::Relaxed),
        }
    }
}

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let code;
    let message;

    if err.is_not_found() {
        code = warp::http::StatusCode::NOT_FOUND;
        message = "Not Found".to_string();
    } else if let Some(api_error) = err.find::<ApiError>() {
        code = api_error.status;
        message = api_error.message.clone();
    } else if let Some(query_error) = err.find::<warp::reject::InvalidQuery>() {
        code = warp::http::StatusCode::BAD_REQUEST;
        message = query_error.to_string();
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        code = warp::http::StatusCode::METHOD_NOT_ALLOWED;
        message = "Method Not Allowed".to_string();
    } else {
        code = warp::http::StatusCode::INTERNAL_SERVER_ERROR;
        message = "Internal Server Error".to_string();
    }

    Ok(warp::reply::with_status(
        warp::reply::json(&serde_json::json!({
            "error": message,
        })),
        code,
    ))
}

pub fn routes(state: Arc<AppState>) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    info!("Configuring routes...");

    let state_filter = warp::any().map(move || state.clone());

    let stocks_route = warp::path!("api" / "v1" / "stocks")
        .and(warp::get())
        .and(warp::query::<StocksParams>())
        .and(state_filter.clone())
        .and_then(get_stocks);

    let health_route = warp::path!("api" / "v1" / "health")
        .and(warp::get())
        .map(|| warp::reply::json(&serde_json::json!({ "status": "ok" })));

    info!("All routes configured successfully.");

    stocks_route
        .or(health_route)
        .recover(handle_rejection)
}
