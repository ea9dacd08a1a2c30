use log::{error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use warp::Filter;

use magic_formula::config::AppConfig;
use magic_formula::routes::{self, AppState};
use magic_formula::services;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize the logger
    env_logger::init();
    info!("Logger initialized. Starting the application...");

    let config = AppConfig::from_env().map_err(|e| {
        error!("Invalid configuration: {:#}", e);
        e
    })?;
    info!("Using PORT: {}", config.port);

    let result_cache = services::result_cache(&config)?;
    let state = Arc::new(AppState::new(result_cache));

    // Bind to 0.0.0.0 for container deployments
    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    info!("Will bind to: {}", addr);

    // Set up CORS
    let cors = warp::cors()
        .allow_any_origin()
        .allow_header("content-type")
        .allow_methods(vec!["GET"]);

    let api = routes::routes(state).with(cors);
    info!("Routes configured successfully with CORS.");

    info!("Starting server on {}", addr);
    warp::serve(api).run(addr).await;
    Ok(())
}
