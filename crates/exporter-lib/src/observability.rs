//! Observability infrastructure for the exporter
//!
//! Provides:
//! - Process-wide Prometheus metrics about the scheduler itself
//! - The per-source scrape duration summary served with every scrape
//! - Structured JSON logging with tracing

use crate::models::SourceResult;
use prometheus::proto::{LabelPair, Metric, MetricFamily, MetricType, Summary};
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::collections::BTreeMap;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Histogram buckets for collection pass duration (in seconds)
const PASS_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Name of the per-source duration summary
pub const SCRAPE_DURATION_NAME: &str = "lustre_exporter_scrape_duration_seconds";

const SCRAPE_DURATION_HELP: &str = "lustre_exporter: Duration of a scrape job.";

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ExporterMetricsInner> = OnceLock::new();

struct ExporterMetricsInner {
    passes_started: IntCounter,
    coalesced_scrapes: IntCounter,
    in_flight_workers: IntGauge,
    source_errors: IntCounterVec,
    pass_duration_seconds: Histogram,
}

impl ExporterMetricsInner {
    fn new() -> Self {
        Self {
            passes_started: register_int_counter!(
                "lustre_exporter_passes_started_total",
                "Collection passes started over all sources"
            )
            .expect("Failed to register passes_started"),

            coalesced_scrapes: register_int_counter!(
                "lustre_exporter_coalesced_scrapes_total",
                "Scrapes served by an already running or recently completed pass"
            )
            .expect("Failed to register coalesced_scrapes"),

            in_flight_workers: register_int_gauge!(
                "lustre_exporter_in_flight_workers",
                "Collection passes currently running"
            )
            .expect("Failed to register in_flight_workers"),

            source_errors: register_int_counter_vec!(
                "lustre_exporter_source_errors_total",
                "Collection passes in which a source failed",
                &["source"]
            )
            .expect("Failed to register source_errors"),

            pass_duration_seconds: register_histogram!(
                "lustre_exporter_pass_duration_seconds",
                "Wall time of a full collection pass",
                PASS_BUCKETS.to_vec()
            )
            .expect("Failed to register pass_duration_seconds"),
        }
    }
}

/// Exporter self-metrics in the default registry
///
/// A lightweight handle to the global instance; clones share it.
#[derive(Clone)]
pub struct ExporterMetrics {
    _private: (),
}

impl Default for ExporterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ExporterMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ExporterMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ExporterMetricsInner {
        GLOBAL_METRICS.get_or_init(ExporterMetricsInner::new)
    }

    pub fn inc_passes_started(&self) {
        self.inner().passes_started.inc();
    }

    pub fn inc_coalesced_scrapes(&self) {
        self.inner().coalesced_scrapes.inc();
    }

    pub fn set_in_flight_workers(&self, count: usize) {
        self.inner().in_flight_workers.set(count as i64);
    }

    pub fn inc_source_errors(&self, source: &str) {
        self.inner().source_errors.with_label_values(&[source]).inc();
    }

    pub fn observe_pass_duration(&self, elapsed: Duration) {
        self.inner()
            .pass_duration_seconds
            .observe(elapsed.as_secs_f64());
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct SummaryState {
    count: u64,
    sum: f64,
}

/// `lustre_exporter_scrape_duration_seconds{source,result}`
///
/// Kept outside the default registry and appended to every scrape
/// response. Exposes count and sum per series.
#[derive(Debug, Default)]
pub struct ScrapeDurations {
    series: Mutex<BTreeMap<(String, SourceResult), SummaryState>>,
}

impl ScrapeDurations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one publish of `source`
    pub fn observe(&self, source: &str, result: SourceResult, elapsed: Duration) {
        let mut series = self.series.lock().unwrap_or_else(|e| e.into_inner());
        let state = series.entry((source.to_string(), result)).or_default();
        state.count += 1;
        state.sum += elapsed.as_secs_f64();
    }

    /// Observations recorded for one series
    pub fn count(&self, source: &str, result: SourceResult) -> u64 {
        let series = self.series.lock().unwrap_or_else(|e| e.into_inner());
        series
            .get(&(source.to_string(), result))
            .map(|s| s.count)
            .unwrap_or(0)
    }

    /// The summary as a metric family, `None` before the first observation
    pub fn family(&self) -> Option<MetricFamily> {
        let series = self.series.lock().unwrap_or_else(|e| e.into_inner());
        if series.is_empty() {
            return None;
        }

        let metrics: Vec<Metric> = series
            .iter()
            .map(|((source, result), state)| {
                let mut summary = Summary::default();
                summary.set_sample_count(state.count);
                summary.set_sample_sum(state.sum);

                let mut metric = Metric::default();
                metric.set_label(
                    vec![label_pair("result", result.as_str()), label_pair("source", source)]
                        .into(),
                );
                metric.set_summary(summary);
                metric
            })
            .collect();

        let mut family = MetricFamily::default();
        family.set_name(SCRAPE_DURATION_NAME.to_string());
        family.set_help(SCRAPE_DURATION_HELP.to_string());
        family.set_field_type(MetricType::SUMMARY);
        family.set_metric(metrics.into());
        Some(family)
    }
}

fn label_pair(name: &str, value: &str) -> LabelPair {
    let mut pair = LabelPair::default();
    pair.set_name(name.to_string());
    pair.set_value(value.to_string());
    pair
}

/// Structured logger for exporter events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log exporter startup
    pub fn log_startup(&self, version: &str, mode: &str, sources: &[String]) {
        info!(
            event = "exporter_started",
            instance = %self.instance,
            version = %version,
            collect_mode = %mode,
            sources = ?sources,
            "Lustre exporter started"
        );
    }

    /// Log exporter shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "exporter_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Lustre exporter shutting down"
        );
    }

    /// Log a source that failed within a pass
    pub fn log_source_failure(&self, pass: u64, source: &str, error: &str, elapsed: Duration) {
        warn!(
            event = "source_failed",
            instance = %self.instance,
            pass = pass,
            source = %source,
            error = %error,
            elapsed_ms = elapsed.as_millis() as u64,
            "Metric source failed"
        );
    }

    /// Log the end of a collection pass
    pub fn log_pass_completed(&self, pass: u64, sources: usize, failed: usize, elapsed: Duration) {
        debug!(
            event = "pass_completed",
            instance = %self.instance,
            pass = pass,
            sources = sources,
            failed = failed,
            elapsed_ms = elapsed.as_millis() as u64,
            "Collection pass completed"
        );
    }
}
