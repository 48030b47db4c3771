//! Collection context for one Lustre source root

use super::catalog::{MetricDef, Shape};
use super::file_reader::FileReader;
use super::job_stats::{parse_job_stats, JobStatsBuf, JobStatsPool};
use super::parse::{
    parse_health, parse_histogram, parse_io_bytes, parse_lnet_stats, parse_operations,
    parse_scalar, target_from_path, STATS_OPERATIONS,
};
use super::{async_trait, CollectionContext, MetricSource};
use crate::config::ComponentLevels;
use crate::error::CollectError;
use crate::models::{Label, MetricSample, SeriesKey};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Source over one filesystem root and its slice of the catalogue
pub struct LustreSource {
    name: Arc<str>,
    root: PathBuf,
    metrics: Arc<[&'static MetricDef]>,
    pool: Arc<JobStatsPool>,
}

impl LustreSource {
    /// Keep the catalogue entries admitted by `levels`
    pub fn new(
        name: &str,
        root: impl Into<PathBuf>,
        catalogue: &'static [MetricDef],
        levels: &ComponentLevels,
        pool: Arc<JobStatsPool>,
    ) -> Self {
        let metrics: Vec<&'static MetricDef> = catalogue
            .iter()
            .filter(|def| levels.level_for(def.component).admits(def.level))
            .collect();

        Self {
            name: Arc::from(name),
            root: root.into(),
            metrics: Arc::from(metrics),
            pool,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Catalogue entries this source collects
    pub fn metrics(&self) -> &[&'static MetricDef] {
        &self.metrics
    }

    /// Fresh context, not boxed
    pub fn context(&self) -> LustreContext {
        LustreContext {
            source: Arc::clone(&self.name),
            root: self.root.clone(),
            metrics: Arc::clone(&self.metrics),
            pool: Arc::clone(&self.pool),
            reader: FileReader::new(),
            job_stats: HashMap::new(),
            samples: Vec::new(),
            skipped_files: 0,
            skipped_jobs: 0,
            stage: Stage::Created,
        }
    }
}

impl MetricSource for LustreSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn new_ctx(&self) -> Box<dyn CollectionContext> {
        Box::new(self.context())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Created,
    Prepared,
    Collected,
    Released,
}

/// Per-pass state: file caches, parsed job blocks and the samples
pub struct LustreContext {
    source: Arc<str>,
    root: PathBuf,
    metrics: Arc<[&'static MetricDef]>,
    pool: Arc<JobStatsPool>,
    reader: FileReader,
    job_stats: HashMap<PathBuf, JobStatsBuf>,
    samples: Vec<MetricSample>,
    skipped_files: usize,
    skipped_jobs: usize,
    stage: Stage,
}

impl LustreContext {
    /// Reads that actually reached the filesystem in this pass
    pub fn disk_reads(&self) -> usize {
        self.reader.disk_reads()
    }

    /// Number of `job_stats` files parsed and still held
    pub fn job_stats_files(&self) -> usize {
        self.job_stats.len()
    }

    /// Files dropped from this pass because their content did not parse
    pub fn skipped_files(&self) -> usize {
        self.skipped_files
    }

    /// `job_stats` entries dropped for a missing id or a bad counter
    pub fn skipped_jobs(&self) -> usize {
        self.skipped_jobs
    }

    pub fn is_released(&self) -> bool {
        self.stage == Stage::Released
    }

    /// Resolve every pattern up front so the walks overlap
    async fn prepare(&mut self) {
        for def in self.metrics.iter() {
            self.reader.prefetch(&def.pattern(&self.root));
        }
        self.reader.wait().await;
        self.stage = Stage::Prepared;
    }

    async fn collect_all(&mut self) -> Result<Vec<MetricSample>, CollectError> {
        let mut sink = SampleSink::default();
        let metrics = Arc::clone(&self.metrics);

        for def in metrics.iter() {
            let paths = self.reader.glob(&def.pattern(&self.root)).await?;
            for path in paths.iter() {
                let mark = sink.mark();
                match self.collect_file(def, path, &mut sink).await {
                    Ok(()) => {}
                    // a malformed file only loses its own samples
                    Err(e @ CollectError::Parse { .. }) => {
                        warn!(
                            source = %self.source,
                            path = %path.display(),
                            metric = def.name,
                            error = %e,
                            "Skipping unparsable file"
                        );
                        sink.rollback(mark);
                        self.skipped_files += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(sink.samples)
    }

    async fn collect_file(
        &mut self,
        def: &MetricDef,
        path: &Path,
        sink: &mut SampleSink,
    ) -> Result<(), CollectError> {
        let target =
            target_from_path(path, def.depth()).map_err(|e| CollectError::parse(path, e))?;
        let target = target.as_str();

        match def.shape {
            Shape::Scalar => {
                let text = self.reader.read_file(path).await?;
                let value = parse_scalar(&text).map_err(|e| CollectError::parse(path, e))?;
                sink.push(def, &[def.component, target], value)?;
            }
            Shape::Health => {
                let text = self.reader.read_file(path).await?;
                sink.push(def, &[def.component, target], parse_health(&text))?;
            }
            Shape::Histogram { heading } => {
                let text = self.reader.read_file(path).await?;
                let rows =
                    parse_histogram(&text, heading).map_err(|e| CollectError::parse(path, e))?;
                for row in rows {
                    sink.push(
                        def,
                        &[def.component, target, row.operation, row.size.as_str()],
                        row.value,
                    )?;
                }
            }
            Shape::Operations => {
                let text = self.reader.read_file(path).await?;
                let ops = parse_operations(&text, STATS_OPERATIONS)
                    .map_err(|e| CollectError::parse(path, e))?;
                for (op, value) in ops {
                    sink.push(def, &[def.component, target, op], value)?;
                }
            }
            Shape::IoBytes { field, position } => {
                let text = self.reader.read_file(path).await?;
                if let Some(value) = parse_io_bytes(&text, field, position)
                    .map_err(|e| CollectError::parse(path, e))?
                {
                    sink.push(def, &[def.component, target], value)?;
                }
            }
            Shape::LnetStats { index } => {
                let text = self.reader.read_file(path).await?;
                if let Some(value) =
                    parse_lnet_stats(&text, index).map_err(|e| CollectError::parse(path, e))?
                {
                    sink.push(def, &[def.component, target], value)?;
                }
            }
            Shape::JobOperations => {
                let jobs = self.job_stats(path).await?;
                for job in jobs.jobs() {
                    for (op, value) in job.operation_counters() {
                        let labels = [def.component, target, job.job_id.as_str(), op];
                        sink.push(def, &labels, value as f64)?;
                    }
                }
            }
            Shape::JobIoBytes { field, position } => {
                let jobs = self.job_stats(path).await?;
                for job in jobs.jobs() {
                    if let Some(value) = job.io_value(field, position) {
                        let labels = [def.component, target, job.job_id.as_str()];
                        sink.push(def, &labels, value as f64)?;
                    }
                }
            }
        }

        Ok(())
    }

    /// Parsed jobs of `path`, parsing the file on first use in this pass
    async fn job_stats(&mut self, path: &Path) -> Result<&JobStatsBuf, CollectError> {
        if !self.job_stats.contains_key(path) {
            let text = self.reader.read_file(path).await?;
            let mut buf = self.pool.acquire();
            let skipped = parse_job_stats(&text, &mut buf);
            self.skipped_jobs += skipped;
            debug!(
                source = %self.source,
                path = %path.display(),
                jobs = buf.len(),
                skipped,
                "Parsed job_stats"
            );
            self.job_stats.insert(path.to_path_buf(), buf);
        }
        self.job_stats
            .get(path)
            .ok_or_else(|| CollectError::Task(format!("job_stats for {} vanished", path.display())))
    }
}

#[async_trait]
impl CollectionContext for LustreContext {
    async fn collect(&mut self) -> Result<(), CollectError> {
        if self.stage != Stage::Created {
            return Ok(());
        }

        self.prepare().await;
        let result = self.collect_all().await;
        self.stage = Stage::Collected;

        match result {
            Ok(samples) => {
                debug!(
                    source = %self.source,
                    samples = samples.len(),
                    skipped_files = self.skipped_files,
                    skipped_jobs = self.skipped_jobs,
                    "Collected source"
                );
                self.samples = samples;
                Ok(())
            }
            Err(e) => {
                self.samples.clear();
                Err(e)
            }
        }
    }

    fn update(&self, out: &mut Vec<MetricSample>) {
        out.extend_from_slice(&self.samples);
    }

    fn release(&mut self) {
        if self.stage == Stage::Released {
            return;
        }
        self.reader.release();
        for (_, buf) in self.job_stats.drain() {
            self.pool.recycle(buf);
        }
        self.stage = Stage::Released;
    }
}

/// Samples of one pass with series de-duplication
#[derive(Default)]
struct SampleSink {
    samples: Vec<MetricSample>,
    seen: HashSet<SeriesKey>,
}

impl SampleSink {
    fn push(&mut self, def: &MetricDef, values: &[&str], value: f64) -> Result<(), CollectError> {
        let labels = def
            .shape
            .label_names()
            .iter()
            .zip(values)
            .map(|(name, value)| Label::new(*name, *value))
            .collect();
        let sample = MetricSample::new(def.kind, def.full_name(), def.help, labels, value);

        let key = sample.series_key();
        if self.seen.contains(&key) {
            return Err(CollectError::DuplicateSeries {
                series: key.to_string(),
            });
        }
        self.seen.insert(key);
        self.samples.push(sample);
        Ok(())
    }

    fn mark(&self) -> usize {
        self.samples.len()
    }

    /// Drop every sample pushed since `mark`
    fn rollback(&mut self, mark: usize) {
        for sample in self.samples.drain(mark..) {
            self.seen.remove(&sample.series_key());
        }
    }
}
