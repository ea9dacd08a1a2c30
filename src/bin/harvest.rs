use anyhow::Result;
use log::{error, info, warn};
use std::env;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};

use magic_formula::config::AppConfig;
use magic_formula::services;
use magic_formula::services::cache::CacheStore;
use magic_formula::services::harvester::Harvester;
use magic_formula::services::status_invest::StatusInvestClient;

async fn run_cycle(harvester: &Harvester, result_cache: &dyn CacheStore) {
    match harvester.refresh_universe(result_cache).await {
        Ok(stats) => info!(
            "Harvest cycle done: {}/{} tickers published",
            stats.succeeded, stats.requested
        ),
        Err(e) => error!("Harvest cycle failed: {:#}", e),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let run_once = env::args().skip(1).any(|arg| arg == "--once");
    let config = AppConfig::from_env()?;
    info!(
        "Starting harvester: {} parallel requests, refresh every {:?}",
        config.parallel_requests, config.refresh_interval
    );

    let source = Arc::new(StatusInvestClient::new(config.fetch_timeout)?);
    let scrape_cache = services::scrape_cache(&config);
    let result_cache = services::result_cache(&config)?;
    let harvester = Arc::new(Harvester::new(&config, source, scrape_cache));

    run_cycle(&harvester, result_cache.as_ref()).await;
    if run_once {
        return Ok(());
    }

    // Held for the length of a cycle; a tick that finds it taken is skipped.
    let running = Arc::new(Mutex::new(()));
    let sched = JobScheduler::new().await?;
    let job = Job::new_repeated_async(config.refresh_interval, move |_uuid, _lock| {
        let harvester = harvester.clone();
        let result_cache = result_cache.clone();
        let running = running.clone();
        Box::pin(async move {
            let Ok(_guard) = running.try_lock() else {
                warn!("Previous harvest cycle still running, skipping this tick");
                return;
            };
            run_cycle(&harvester, result_cache.as_ref()).await;
        })
    })?;
    sched.add(job).await?;
    sched.start().await?;
    info!("Harvest job scheduled");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down harvester");
    Ok(())
}
