//! pocketsw server entry point.
//!
//! Boots the cache worker (install, then activate), starts the periodic
//! cleanup loop and serves the control tools over MCP on stdio.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::{Context, Result};
use pocketsw_client::{FetchClient, FetchConfig, ServiceWorker};
use pocketsw_core::{AppConfig, CacheDb};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tokio::time::{Duration, MissedTickBehavior};
use tracing_subscriber::EnvFilter;

mod error;
mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("loading configuration")?;
    tracing::info!(
        origin = %config.origin,
        static_partition = %config.static_partition(),
        dynamic_partition = %config.dynamic_partition(),
        "Starting pocketsw server on stdio transport"
    );

    let cache = CacheDb::open(&config.db_path)
        .await
        .with_context(|| format!("opening cache database {}", config.db_path.display()))?;
    let network = Arc::new(FetchClient::new(FetchConfig::from(&config))?);
    let worker = Arc::new(ServiceWorker::new(&config, cache, network)?);

    // A failed install leaves the worker redundant; requests then pass through.
    if worker.install().await.is_ok() {
        worker.activate().await?;
    }

    let cleanup = tokio::spawn(cleanup_loop(worker.clone(), config.cleanup_interval()));

    let handler = handler::PocketServer::new(worker.clone());
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    cleanup.abort();
    worker.drain().await;
    tracing::info!(metrics = ?worker.metrics(), "pocketsw server stopped");

    Ok(())
}

/// Evict expired dynamic entries every `period`.
async fn cleanup_loop(worker: Arc<ServiceWorker>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it so startup stays quiet.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if let Err(e) = worker.cleanup().await {
            tracing::debug!(error = %e, "cleanup pass failed; retrying next interval");
        }
    }
}
