//! Scrape-coalescing collection scheduler
//!
//! Scrapes never drive the filesystem directly. Each one is served by a
//! [`Worker`] (one collection pass over every source):
//! - the last completed pass, while it is younger than the shelf life
//! - otherwise a new pass, while fewer than `max_workers` are running
//! - otherwise the oldest running pass
//!
//! Legacy `v1` mode runs one private pass per scrape instead.

mod worker;

#[cfg(test)]
mod tests;

pub use worker::{SourceOutcome, Worker};

use crate::collector::{JobStatsPool, MetricSource};
use crate::config::{CollectMode, SchedulerConfig};
use crate::exposition::metric_families;
use crate::health::HealthRegistry;
use crate::models::{MetricSample, SourceResult};
use crate::observability::{ExporterMetrics, ScrapeDurations, StructuredLogger};
use anyhow::Result;
use prometheus::proto::MetricFamily;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Default)]
struct State {
    /// Running passes, oldest first
    in_flight: Vec<Arc<Worker>>,
    last_completed: Option<Arc<Worker>>,
}

/// Coalesces scrapes onto shared collection passes
pub struct Scheduler {
    sources: Vec<Arc<dyn MetricSource>>,
    config: SchedulerConfig,
    pool: Arc<JobStatsPool>,
    state: Mutex<State>,
    durations: ScrapeDurations,
    health: Option<HealthRegistry>,
    metrics: ExporterMetrics,
    logger: StructuredLogger,
    next_id: AtomicU64,
}

impl Scheduler {
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<JobStatsPool> {
        &self.pool
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    /// Per-source duration summary
    pub fn durations(&self) -> &ScrapeDurations {
        &self.durations
    }

    /// Collection passes started so far
    pub fn passes_started(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst)
    }

    /// Passes currently running
    pub fn in_flight(&self) -> usize {
        self.lock_state().in_flight.len()
    }

    /// Register one health component per source
    pub async fn register_health(&self) {
        if let Some(health) = &self.health {
            for source in &self.sources {
                health.register(source.name()).await;
            }
        }
    }

    /// Samples plus the duration summary, ready for exposition
    pub async fn update(self: &Arc<Self>) -> Vec<MetricFamily> {
        let samples = self.collect().await;
        let mut families = metric_families(&samples);
        families.extend(self.durations.family());
        families
    }

    /// Samples of the pass serving this scrape
    pub async fn collect(self: &Arc<Self>) -> Vec<MetricSample> {
        match self.config.mode {
            CollectMode::V2 => {
                let worker = self.acquire_worker();
                worker.wait().await;
                worker.publish(&self.durations).await
            }
            CollectMode::V1 => self.collect_legacy().await,
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Pick the worker serving a scrape, starting one if allowed
    fn acquire_worker(self: &Arc<Self>) -> Arc<Worker> {
        let now = Instant::now();
        let mut state = self.lock_state();

        if let Some(last) = &state.last_completed {
            if last.is_fresh(now, self.config.shelf_life) {
                debug!(pass = last.id(), "Replaying completed pass");
                self.metrics.inc_coalesced_scrapes();
                return Arc::clone(last);
            }
        }

        if state.in_flight.len() < self.config.max_workers {
            let worker = self.start_worker();
            state.in_flight.push(Arc::clone(&worker));
            self.metrics.set_in_flight_workers(state.in_flight.len());

            let scheduler = Arc::clone(self);
            let driven = Arc::clone(&worker);
            tokio::spawn(async move { scheduler.drive(driven).await });
            return worker;
        }

        // at capacity: share the oldest running pass
        let oldest = Arc::clone(&state.in_flight[0]);
        debug!(pass = oldest.id(), "Attaching to running pass");
        self.metrics.inc_coalesced_scrapes();
        oldest
    }

    fn start_worker(&self) -> Arc<Worker> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.metrics.inc_passes_started();
        debug!(pass = id, sources = self.sources.len(), "Starting collection pass");
        Worker::new(id, &self.sources)
    }

    async fn drive(self: Arc<Self>, worker: Arc<Worker>) {
        let elapsed = worker.run().await;

        {
            let mut state = self.lock_state();
            state.last_completed = Some(Arc::clone(&worker));
            state.in_flight.retain(|w| !Arc::ptr_eq(w, &worker));
            self.metrics.set_in_flight_workers(state.in_flight.len());
        }
        worker.complete();

        self.record_outcomes(&worker, elapsed).await;

        tokio::spawn(async move { worker.release().await });
    }

    async fn collect_legacy(&self) -> Vec<MetricSample> {
        let worker = self.start_worker();
        let elapsed = worker.run().await;
        worker.complete();
        self.record_outcomes(&worker, elapsed).await;

        let samples = worker.publish(&self.durations).await;
        worker.release().await;
        samples
    }

    async fn record_outcomes(&self, worker: &Worker, elapsed: Duration) {
        let mut failed = 0;
        for (name, outcome) in worker.outcomes() {
            let Some(outcome) = outcome else {
                continue;
            };
            match (&outcome.result, &outcome.error) {
                (SourceResult::Error, error) => {
                    failed += 1;
                    let message = error
                        .as_ref()
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "collection failed".to_string());
                    self.metrics.inc_source_errors(name);
                    self.logger
                        .log_source_failure(worker.id(), name, &message, outcome.elapsed);
                    if let Some(health) = &self.health {
                        health.record_failure(name, message).await;
                    }
                }
                (SourceResult::Success, _) => {
                    if let Some(health) = &self.health {
                        health.set_healthy(name).await;
                    }
                }
            }
        }

        self.metrics.observe_pass_duration(elapsed);
        self.logger
            .log_pass_completed(worker.id(), self.sources.len(), failed, elapsed);
    }
}

/// Builder for the scheduler
pub struct SchedulerBuilder {
    sources: Option<Vec<Arc<dyn MetricSource>>>,
    config: SchedulerConfig,
    pool: Option<Arc<JobStatsPool>>,
    health: Option<HealthRegistry>,
    logger: Option<StructuredLogger>,
}

impl SchedulerBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            sources: None,
            config: SchedulerConfig::default(),
            pool: None,
            health: None,
            logger: None,
        }
    }

    /// Set the metric sources collected by every pass
    pub fn sources(mut self, sources: Vec<Arc<dyn MetricSource>>) -> Self {
        self.sources = Some(sources);
        self
    }

    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn mode(mut self, mode: CollectMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn max_workers(mut self, max_workers: usize) -> Self {
        self.config.max_workers = max_workers;
        self
    }

    pub fn shelf_life(mut self, shelf_life: Duration) -> Self {
        self.config.shelf_life = shelf_life;
        self
    }

    /// Share the job-state pool the sources were built with
    pub fn pool(mut self, pool: Arc<JobStatsPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Build the scheduler
    pub fn build(self) -> Result<Arc<Scheduler>> {
        let sources = self
            .sources
            .ok_or_else(|| anyhow::anyhow!("Metric sources are required"))?;
        if sources.is_empty() {
            anyhow::bail!("At least one metric source is required");
        }

        Ok(Arc::new(Scheduler {
            sources,
            config: self.config.normalized(),
            pool: self.pool.unwrap_or_default(),
            state: Mutex::new(State::default()),
            durations: ScrapeDurations::new(),
            health: self.health,
            metrics: ExporterMetrics::new(),
            logger: self
                .logger
                .unwrap_or_else(|| StructuredLogger::new("lustre-exporter")),
            next_id: AtomicU64::new(0),
        }))
    }
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
