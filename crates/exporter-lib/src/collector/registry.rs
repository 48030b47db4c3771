//! Source registry: maps configured source names to sources

use super::catalog::{PROCFS_METRICS, PROCSYS_METRICS, SYSFS_METRICS};
use super::context::LustreSource;
use super::job_stats::JobStatsPool;
use super::MetricSource;
use crate::config::CollectorConfig;
use crate::error::RegistryError;
use std::sync::Arc;
use tracing::info;

/// Sources enabled when none are configured
pub const DEFAULT_SOURCES: [&str; 3] = ["procfs", "procsys", "sysfs"];

/// Build the named sources
///
/// Names are `procfs` (`<proc>/fs/lustre`), `procsys` (`<proc>/sys/lnet`)
/// and `sysfs` (`<sys>/fs/lustre`). An unknown or repeated name fails the
/// whole load.
pub fn load_sources<S: AsRef<str>>(
    names: &[S],
    config: &CollectorConfig,
    pool: Arc<JobStatsPool>,
) -> Result<Vec<Arc<dyn MetricSource>>, RegistryError> {
    let mut sources: Vec<Arc<dyn MetricSource>> = Vec::with_capacity(names.len());

    for name in names {
        let name = name.as_ref();
        if sources.iter().any(|s| s.name() == name) {
            return Err(RegistryError::DuplicateSource(name.to_string()));
        }

        let source = match name {
            "procfs" => LustreSource::new(
                name,
                config.proc_path.join("fs/lustre"),
                PROCFS_METRICS,
                &config.levels,
                Arc::clone(&pool),
            ),
            "procsys" => LustreSource::new(
                name,
                config.proc_path.join("sys/lnet"),
                PROCSYS_METRICS,
                &config.levels,
                Arc::clone(&pool),
            ),
            "sysfs" => LustreSource::new(
                name,
                config.sys_path.join("fs/lustre"),
                SYSFS_METRICS,
                &config.levels,
                Arc::clone(&pool),
            ),
            other => return Err(RegistryError::UnknownSource(other.to_string())),
        };

        info!(
            source = %name,
            root = %source.root().display(),
            metrics = source.metrics().len(),
            "Registered metric source"
        );
        sources.push(Arc::new(source));
    }

    Ok(sources)
}
