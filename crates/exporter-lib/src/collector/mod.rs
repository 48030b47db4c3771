//! Metrics collection from Lustre statistics trees
//!
//! This module turns the proc/sysfs text files of a Lustre node into
//! [`MetricSample`]s. A [`MetricSource`] covers one filesystem root and
//! hands out a fresh [`CollectionContext`] for every collection pass.

mod catalog;
mod context;
mod file_reader;
mod job_stats;
mod parse;
mod registry;


pub use catalog::{MetricDef, Shape, PROCFS_METRICS, PROCSYS_METRICS, SYSFS_METRICS};
pub use context::{LustreContext, LustreSource};
pub use file_reader::FileReader;
pub use job_stats::{
    parse_job_stats, JobState, JobStatsBuf, JobStatsPool, DEFAULT_POOL_RETAIN, JOB_OPERATIONS,
};
pub use parse::{
    convert_to_bytes, parse_health, parse_histogram, parse_io_bytes, parse_lnet_stats,
    parse_operations, parse_scalar, target_from_path, HistogramSample, IoField, IoPosition,
    STATS_OPERATIONS,
};
pub use registry::{load_sources, DEFAULT_SOURCES};

use crate::error::CollectError;
use crate::models::MetricSample;

pub use async_trait::async_trait;

/// Per-pass collection state of one source
///
/// Lifecycle: `collect` once, `update` any number of times, `release`
/// once after the last `update`.
#[async_trait]
pub trait CollectionContext: Send + Sync {
    /// Read and parse every file of the source; later calls do nothing
    async fn collect(&mut self) -> Result<(), CollectError>;

    /// Append the collected samples to `out`
    fn update(&self, out: &mut Vec<MetricSample>);

    /// Free per-pass caches, keeping the collected samples
    fn release(&mut self);
}

/// A named producer of collection contexts
pub trait MetricSource: Send + Sync {
    fn name(&self) -> &str;

    fn new_ctx(&self) -> Box<dyn CollectionContext>;
}
