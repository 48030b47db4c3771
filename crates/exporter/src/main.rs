//! Lustre Exporter - Prometheus exporter for Lustre filesystem statistics
//!
//! Serves metrics read from the Lustre proc and sys trees. Concurrent
//! scrapes share collection passes so the filesystem is read at most once
//! per shelf life.

use anyhow::{Context, Result};
use clap::Parser;
use exporter_lib::{
    collector::{load_sources, JobStatsPool},
    HealthRegistry, SchedulerBuilder, StructuredLogger,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const EXPORTER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting lustre-exporter");

    let cli = config::Cli::parse();
    let config = config::ExporterConfig::load(&cli)?;
    info!(
        listen_address = %config.listen_address,
        telemetry_path = %config.telemetry_path,
        proc_path = %config.collector.proc_path.display(),
        sys_path = %config.collector.sys_path.display(),
        "Exporter configured"
    );

    let pool = Arc::new(JobStatsPool::default());
    let sources = load_sources(config.sources.as_slice(), &config.collector, Arc::clone(&pool))
        .context("Failed to load metric sources")?;

    let health_registry = HealthRegistry::new();
    let logger = StructuredLogger::new(hostname());
    let scheduler_config = config.scheduler_config();
    let mode = scheduler_config.mode;

    let scheduler = SchedulerBuilder::new()
        .sources(sources)
        .config(scheduler_config)
        .pool(pool)
        .health(health_registry.clone())
        .logger(logger.clone())
        .build()?;
    scheduler.register_health().await;

    logger.log_startup(EXPORTER_VERSION, mode.as_str(), &scheduler.source_names());

    let app_state = Arc::new(api::AppState::new(
        scheduler,
        health_registry.clone(),
        config.telemetry_path.clone(),
    ));

    // Mark exporter as ready after initialization
    health_registry.set_ready(true).await;

    let mut api_handle = tokio::spawn(api::serve(config.bind_address(), app_state));

    tokio::select! {
        result = &mut api_handle => {
            match result {
                Ok(Ok(())) => logger.log_shutdown("API server stopped"),
                Ok(Err(e)) => {
                    error!(error = %e, "API server failed");
                    return Err(e);
                }
                Err(e) => return Err(e).context("API server task failed"),
            }
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
            api_handle.abort();
        }
    }

    info!("Shutting down");
    Ok(())
}

/// Instance name used in structured log events
fn hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::fs::read_to_string("/etc/hostname").map(|h| h.trim().to_string()))
        .unwrap_or_else(|_| "unknown".to_string())
}
