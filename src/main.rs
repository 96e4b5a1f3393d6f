mod api;
mod brands;
mod config;
mod dispatch;
mod error;
mod poller;
mod scheduler;
mod scorer;
mod store;
mod types;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::health::HealthState;
use crate::api::routes::{router, ApiState};
use crate::brands::BrandBook;
use crate::config::{Config, HTTP_TIMEOUT_SECS};
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::poller::CategoryPoller;
use crate::scheduler::Scheduler;
use crate::store::{DedupStore, PersistenceAdapter, RetryPolicy};
use crate::types::Category;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Startup preconditions: the only fail-fast path ---
    let brands = Arc::new(BrandBook::load(&cfg.brands_file)?);
    info!(
        "Tracking {} brands, {} search terms, price band ${:.2}-${:.2}",
        brands.len(),
        cfg.search_terms.len(),
        cfg.min_price_usd,
        cfg.max_price_usd,
    );

    // --- Durable store: connect with retry, degrade instead of dying ---
    let adapter = Arc::new(PersistenceAdapter::new(&cfg.db_path, RetryPolicy::default()));
    if adapter.connect().await.is_err() {
        warn!("Starting without durable store — dedup is in-process only until it recovers");
    }
    let dedup = Arc::new(DedupStore::new(Arc::clone(&adapter)));

    // --- Shared HTTP client for marketplace fetch and webhook delivery ---
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()?;

    // Priority order: instant-purchase listings are actionable right now, so
    // that poller always runs first within a cycle.
    let pollers: Vec<CategoryPoller> = Category::CYCLE_ORDER
        .iter()
        .map(|&cat| CategoryPoller::new(cat, client.clone(), &cfg, Arc::clone(&brands)))
        .collect();

    let dispatcher = Dispatcher::new(client, &cfg.webhook_url);
    let health = Arc::new(HealthState::new());

    // --- Scheduler loop ---
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = Scheduler::new(
        cfg.clone(),
        pollers,
        Arc::clone(&brands),
        Arc::clone(&dedup),
        dispatcher,
        Arc::clone(&health),
        shutdown_rx,
    );
    let scheduler_handle = tokio::spawn(scheduler.run());

    // --- HTTP API server (independent listener; never blocked by polling) ---
    let api_state = ApiState {
        dedup: Arc::clone(&dedup),
        health: Arc::clone(&health),
        brands_tracked: brands.len(),
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let the in-flight fetch/dispatch finish rather than abandoning it
    // mid-write; the scheduler exits at the next term boundary.
    info!("Shutdown requested — waiting for scheduler to finish current step");
    let _ = shutdown_tx.send(true);
    if tokio::time::timeout(Duration::from_secs(30), scheduler_handle)
        .await
        .is_err()
    {
        warn!("Scheduler did not stop within 30s — exiting anyway");
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
    }
}
