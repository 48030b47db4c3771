//! One collection pass over every source

use crate::collector::{CollectionContext, MetricSource};
use crate::error::CollectError;
use crate::models::{MetricSample, SourceResult};
use crate::observability::ScrapeDurations;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::time::Instant;

/// How one source fared in a pass
#[derive(Debug, Clone)]
pub struct SourceOutcome {
    pub result: SourceResult,
    pub elapsed: Duration,
    pub error: Option<CollectError>,
}

struct SourceRun {
    name: String,
    ctx: RwLock<Box<dyn CollectionContext>>,
    outcome: OnceLock<SourceOutcome>,
}

/// A collection pass shared by every scrape that attaches to it
///
/// Contexts are written only while collecting and on release; publishing
/// takes read locks, so any number of scrapes replay concurrently.
pub struct Worker {
    id: u64,
    end: OnceLock<Instant>,
    sources: Vec<SourceRun>,
    done: watch::Sender<bool>,
}

impl Worker {
    pub(crate) fn new(id: u64, sources: &[Arc<dyn MetricSource>]) -> Arc<Self> {
        let (done, _) = watch::channel(false);
        Arc::new(Self {
            id,
            end: OnceLock::new(),
            sources: sources
                .iter()
                .map(|s| SourceRun {
                    name: s.name().to_string(),
                    ctx: RwLock::new(s.new_ctx()),
                    outcome: OnceLock::new(),
                })
                .collect(),
            done,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Completed no longer than `shelf_life` before `now`
    pub fn is_fresh(&self, now: Instant, shelf_life: Duration) -> bool {
        self.end
            .get()
            .is_some_and(|end| now.saturating_duration_since(*end) <= shelf_life)
    }

    /// Outcome per source, in source order; `None` while still running
    pub fn outcomes(&self) -> impl Iterator<Item = (&str, Option<&SourceOutcome>)> {
        self.sources
            .iter()
            .map(|run| (run.name.as_str(), run.outcome.get()))
    }

    /// Collect every source on its own task and wait for all of them
    pub(crate) async fn run(self: &Arc<Self>) -> Duration {
        let started = Instant::now();

        let handles: Vec<_> = (0..self.sources.len())
            .map(|idx| {
                let worker = Arc::clone(self);
                tokio::spawn(async move { worker.collect_source(idx).await })
            })
            .collect();

        for (idx, handle) in handles.into_iter().enumerate() {
            if let Err(e) = handle.await {
                let _ = self.sources[idx].outcome.set(SourceOutcome {
                    result: SourceResult::Error,
                    elapsed: started.elapsed(),
                    error: Some(CollectError::Task(e.to_string())),
                });
            }
        }

        let _ = self.end.set(Instant::now());
        started.elapsed()
    }

    async fn collect_source(&self, idx: usize) {
        let run = &self.sources[idx];
        let started = Instant::now();
        let result = run.ctx.write().await.collect().await;
        let elapsed = started.elapsed();

        let outcome = match result {
            Ok(()) => SourceOutcome {
                result: SourceResult::Success,
                elapsed,
                error: None,
            },
            Err(e) => SourceOutcome {
                result: SourceResult::Error,
                elapsed,
                error: Some(e),
            },
        };
        let _ = run.outcome.set(outcome);
    }

    /// Wake everything waiting in [`Worker::wait`]
    pub(crate) fn complete(&self) {
        self.done.send_replace(true);
    }

    /// Wait until the pass has been completed
    pub async fn wait(&self) {
        let mut rx = self.done.subscribe();
        let _ = rx.wait_for(|done| *done).await;
    }

    /// Replay collected samples and record per-source timing
    pub(crate) async fn publish(&self, durations: &ScrapeDurations) -> Vec<MetricSample> {
        let mut out = Vec::new();
        for run in &self.sources {
            let started = Instant::now();
            run.ctx.read().await.update(&mut out);

            let (result, cost) = run
                .outcome
                .get()
                .map(|o| (o.result, o.elapsed))
                .unwrap_or((SourceResult::Error, Duration::ZERO));
            durations.observe(&run.name, result, cost + started.elapsed());
        }
        out
    }

    /// Free every context's caches
    pub(crate) async fn release(&self) {
        for run in &self.sources {
            run.ctx.write().await.release();
        }
    }
}
