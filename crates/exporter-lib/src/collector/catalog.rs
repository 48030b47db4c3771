//! Static catalogue of exported Lustre metrics
//!
//! Every entry names a file (relative to a source root) and how to turn
//! its text into samples. Tables are split by source root:
//! [`PROCFS_METRICS`] under `<proc>/fs/lustre`, [`PROCSYS_METRICS`] under
//! `<proc>/sys/lnet` and [`SYSFS_METRICS`] under `<sys>/fs/lustre`.

use super::parse::IoField::{self, Read, Write};
use super::parse::IoPosition::{self, Max, Min, Samples, Sum};
use crate::config::MetricLevel;
use crate::models::MetricKind;
use crate::NAMESPACE;
use std::path::Path;

/// How the text of a catalogue file is read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// One numeric literal
    Scalar,
    /// `health_check`: `1` when healthy
    Health,
    /// Histogram block of `brw_stats` / `rpc_stats` introduced by `heading`
    Histogram { heading: &'static str },
    /// Operation counters of `stats` / `md_stats`
    Operations,
    /// One position of the `read_bytes` / `write_bytes` line
    IoBytes {
        field: IoField,
        position: IoPosition,
    },
    /// Per-job operation counters of `job_stats`
    JobOperations,
    /// One position of each job's byte tuple in `job_stats`
    JobIoBytes {
        field: IoField,
        position: IoPosition,
    },
    /// Positional field of the `lnet/stats` line
    LnetStats { index: usize },
}

impl Shape {
    /// Label names attached to samples of this shape, in emission order
    pub fn label_names(&self) -> &'static [&'static str] {
        match self {
            Shape::Scalar | Shape::Health | Shape::IoBytes { .. } | Shape::LnetStats { .. } => {
                &["component", "target"]
            }
            Shape::Histogram { .. } => &["component", "target", "operation", "size"],
            Shape::Operations => &["component", "target", "operation"],
            Shape::JobOperations => &["component", "target", "jobid", "operation"],
            Shape::JobIoBytes { .. } => &["component", "target", "jobid"],
        }
    }
}

/// One catalogue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricDef {
    /// Directory glob relative to the source root, may be empty
    pub path: &'static str,
    /// File name, may contain `/`
    pub file: &'static str,
    pub component: &'static str,
    /// `Core` entries survive a `core` component level
    pub level: MetricLevel,
    pub shape: Shape,
    /// Metric name without the namespace prefix
    pub name: &'static str,
    pub help: &'static str,
    pub kind: MetricKind,
}

impl MetricDef {
    const fn gauge(
        component: &'static str,
        path: &'static str,
        file: &'static str,
        name: &'static str,
        help: &'static str,
    ) -> Self {
        Self {
            path,
            file,
            component,
            level: MetricLevel::Extended,
            shape: Shape::Scalar,
            name,
            help,
            kind: MetricKind::Gauge,
        }
    }

    const fn counter(
        component: &'static str,
        path: &'static str,
        file: &'static str,
        name: &'static str,
        help: &'static str,
    ) -> Self {
        Self {
            kind: MetricKind::Counter,
            ..Self::gauge(component, path, file, name, help)
        }
    }

    const fn core(self) -> Self {
        Self {
            level: MetricLevel::Core,
            ..self
        }
    }

    const fn shape(self, shape: Shape) -> Self {
        Self { shape, ..self }
    }

    /// Exported name, including the namespace
    pub fn full_name(&self) -> String {
        format!("{NAMESPACE}_{}", self.name)
    }

    /// Number of directory levels inside `file`
    pub fn depth(&self) -> usize {
        self.file.matches('/').count()
    }

    /// Glob pattern for this entry below `root`
    ///
    /// The root itself is escaped so only the catalogue part expands.
    pub fn pattern(&self, root: &Path) -> String {
        let root = glob::Pattern::escape(&root.to_string_lossy());
        let root = root.trim_end_matches('/');
        if self.path.is_empty() {
            format!("{root}/{}", self.file)
        } else {
            format!("{root}/{}/{}", self.path, self.file)
        }
    }
}

const BLOCKSIZE_HELP: &str = "Filesystem block size in bytes";
const INODES_FREE_HELP: &str = "The number of inodes (objects) available";
const INODES_MAX_HELP: &str = "The maximum number of inodes (objects) the filesystem can hold";
const AVAILABLE_HELP: &str = "Number of kilobytes readily available in the pool";
const FREE_HELP: &str = "Number of kilobytes allocated to the pool";
const CAPACITY_HELP: &str = "Capacity of the pool in kilobytes";
const EXPORTS_HELP: &str = "Total number of times the pool has been exported";
const STATS_HELP: &str = "Number of operations the filesystem has performed.";
const JOB_STATS_HELP: &str = "Number of operations the filesystem has performed for a job.";

const READ_SAMPLES_HELP: &str = "Total number of reads that have been recorded.";
const READ_MIN_HELP: &str = "The minimum read size in bytes.";
const READ_MAX_HELP: &str = "The maximum read size in bytes.";
const READ_TOTAL_HELP: &str = "The total number of bytes that have been read.";
const WRITE_SAMPLES_HELP: &str = "Total number of writes that have been recorded.";
const WRITE_MIN_HELP: &str = "The minimum write size in bytes.";
const WRITE_MAX_HELP: &str = "The maximum write size in bytes.";
const WRITE_TOTAL_HELP: &str = "The total number of bytes that have been written.";

const PAGES_PER_BULK_HELP: &str = "Total number of pages per block RPC.";
const DISCONTIGUOUS_PAGES_HELP: &str = "Total number of logical discontinuities per RPC.";
const DISK_IOS_IN_FLIGHT_HELP: &str =
    "Current number of I/O operations that are processing during the snapshot.";
const IO_TIME_HELP: &str =
    "Total time in milliseconds the filesystem has spent processing various object sizes.";
const DISK_IO_SIZE_HELP: &str =
    "Total number of operations the filesystem has performed for the given size.";
const PAGES_PER_RPC_HELP: &str = "Total number of pages per RPC.";
const RPCS_IN_FLIGHT_HELP: &str =
    "Current number of RPCs that are processing during the snapshot.";

const fn io(field: IoField, position: IoPosition) -> Shape {
    Shape::IoBytes { field, position }
}

const fn job_io(field: IoField, position: IoPosition) -> Shape {
    Shape::JobIoBytes { field, position }
}

const fn brw(heading: &'static str) -> Shape {
    Shape::Histogram { heading }
}

/// Entries below `<proc>/fs/lustre`
pub static PROCFS_METRICS: &[MetricDef] = &[
    // OST
    MetricDef::gauge("ost", "obdfilter/*", "blocksize", "blocksize_bytes", BLOCKSIZE_HELP).core(),
    MetricDef::gauge("ost", "obdfilter/*", "filesfree", "inodes_free", INODES_FREE_HELP).core(),
    MetricDef::gauge("ost", "obdfilter/*", "filestotal", "inodes_maximum", INODES_MAX_HELP).core(),
    MetricDef::gauge("ost", "obdfilter/*", "kbytesavail", "available_kilobytes", AVAILABLE_HELP)
        .core(),
    MetricDef::gauge("ost", "obdfilter/*", "kbytesfree", "free_kilobytes", FREE_HELP).core(),
    MetricDef::gauge("ost", "obdfilter/*", "kbytestotal", "capacity_kilobytes", CAPACITY_HELP)
        .core(),
    MetricDef::counter("ost", "obdfilter/*", "num_exports", "exports_total", EXPORTS_HELP).core(),
    MetricDef::gauge(
        "ost",
        "obdfilter/*",
        "tot_dirty",
        "exports_dirty_total",
        "Total number of exports that have been marked dirty",
    ),
    MetricDef::gauge(
        "ost",
        "obdfilter/*",
        "tot_granted",
        "exports_granted_total",
        "Total number of exports that have been marked granted",
    ),
    MetricDef::gauge(
        "ost",
        "obdfilter/*",
        "tot_pending",
        "exports_pending_total",
        "Total number of exports that have been marked pending",
    ),
    MetricDef::counter("ost", "obdfilter/*", "stats", "stats_total", STATS_HELP)
        .core()
        .shape(Shape::Operations),
    MetricDef::counter("ost", "obdfilter/*", "stats", "read_samples_total", READ_SAMPLES_HELP)
        .core()
        .shape(io(Read, Samples)),
    MetricDef::gauge("ost", "obdfilter/*", "stats", "read_minimum_size_bytes", READ_MIN_HELP)
        .shape(io(Read, Min)),
    MetricDef::gauge("ost", "obdfilter/*", "stats", "read_maximum_size_bytes", READ_MAX_HELP)
        .shape(io(Read, Max)),
    MetricDef::counter("ost", "obdfilter/*", "stats", "read_bytes_total", READ_TOTAL_HELP)
        .core()
        .shape(io(Read, Sum)),
    MetricDef::counter("ost", "obdfilter/*", "stats", "write_samples_total", WRITE_SAMPLES_HELP)
        .core()
        .shape(io(Write, Samples)),
    MetricDef::gauge("ost", "obdfilter/*", "stats", "write_minimum_size_bytes", WRITE_MIN_HELP)
        .shape(io(Write, Min)),
    MetricDef::gauge("ost", "obdfilter/*", "stats", "write_maximum_size_bytes", WRITE_MAX_HELP)
        .shape(io(Write, Max)),
    MetricDef::counter("ost", "obdfilter/*", "stats", "write_bytes_total", WRITE_TOTAL_HELP)
        .core()
        .shape(io(Write, Sum)),
    MetricDef::counter(
        "ost",
        "obdfilter/*",
        "brw_stats",
        "pages_per_bulk_rw_total",
        PAGES_PER_BULK_HELP,
    )
    .shape(brw("pages per bulk r/w")),
    MetricDef::counter(
        "ost",
        "obdfilter/*",
        "brw_stats",
        "discontiguous_pages_total",
        DISCONTIGUOUS_PAGES_HELP,
    )
    .shape(brw("discontiguous pages")),
    MetricDef::gauge("ost", "obdfilter/*", "brw_stats", "disk_io_now", DISK_IOS_IN_FLIGHT_HELP)
        .shape(brw("disk I/Os in flight")),
    MetricDef::counter(
        "ost",
        "obdfilter/*",
        "brw_stats",
        "io_time_milliseconds_total",
        IO_TIME_HELP,
    )
    .shape(brw("I/O time")),
    MetricDef::counter("ost", "obdfilter/*", "brw_stats", "disk_io_total", DISK_IO_SIZE_HELP)
        .shape(brw("disk I/O size")),
    MetricDef::counter("ost", "obdfilter/*", "job_stats", "job_stats_total", JOB_STATS_HELP)
        .core()
        .shape(Shape::JobOperations),
    MetricDef::counter(
        "ost",
        "obdfilter/*",
        "job_stats",
        "job_read_samples_total",
        READ_SAMPLES_HELP,
    )
    .shape(job_io(Read, Samples)),
    MetricDef::gauge(
        "ost",
        "obdfilter/*",
        "job_stats",
        "job_read_minimum_size_bytes",
        READ_MIN_HELP,
    )
    .shape(job_io(Read, Min)),
    MetricDef::gauge(
        "ost",
        "obdfilter/*",
        "job_stats",
        "job_read_maximum_size_bytes",
        READ_MAX_HELP,
    )
    .shape(job_io(Read, Max)),
    MetricDef::counter("ost", "obdfilter/*", "job_stats", "job_read_bytes_total", READ_TOTAL_HELP)
        .core()
        .shape(job_io(Read, Sum)),
    MetricDef::counter(
        "ost",
        "obdfilter/*",
        "job_stats",
        "job_write_samples_total",
        WRITE_SAMPLES_HELP,
    )
    .shape(job_io(Write, Samples)),
    MetricDef::gauge(
        "ost",
        "obdfilter/*",
        "job_stats",
        "job_write_minimum_size_bytes",
        WRITE_MIN_HELP,
    )
    .shape(job_io(Write, Min)),
    MetricDef::gauge(
        "ost",
        "obdfilter/*",
        "job_stats",
        "job_write_maximum_size_bytes",
        WRITE_MAX_HELP,
    )
    .shape(job_io(Write, Max)),
    MetricDef::counter(
        "ost",
        "obdfilter/*",
        "job_stats",
        "job_write_bytes_total",
        WRITE_TOTAL_HELP,
    )
    .core()
    .shape(job_io(Write, Sum)),
    MetricDef::gauge(
        "ost",
        "ldlm/namespaces/filter-*",
        "lock_count",
        "lock_count_total",
        "Number of locks currently held",
    ),
    MetricDef::counter(
        "ost",
        "ldlm/namespaces/filter-*",
        "lock_timeouts",
        "lock_timeout_total",
        "Number of lock timeouts",
    ),
    // MDT
    MetricDef::counter("mdt", "mdt/*", "num_exports", "exports_total", EXPORTS_HELP).core(),
    MetricDef::counter("mdt", "mdt/*", "md_stats", "stats_total", STATS_HELP)
        .core()
        .shape(Shape::Operations),
    MetricDef::counter("mdt", "mdt/*", "job_stats", "job_stats_total", JOB_STATS_HELP)
        .core()
        .shape(Shape::JobOperations),
    // MGS
    MetricDef::counter("mgs", "mgs/*", "num_exports", "exports_total", EXPORTS_HELP).core(),
    // MDS
    MetricDef::counter("mds", "mds/MDS/*", "stats", "stats_total", STATS_HELP)
        .core()
        .shape(Shape::Operations),
    // Client
    MetricDef::gauge("client", "llite/*", "blocksize", "blocksize_bytes", BLOCKSIZE_HELP).core(),
    MetricDef::gauge("client", "llite/*", "filesfree", "inodes_free", INODES_FREE_HELP).core(),
    MetricDef::gauge("client", "llite/*", "filestotal", "inodes_maximum", INODES_MAX_HELP).core(),
    MetricDef::gauge("client", "llite/*", "kbytesavail", "available_kilobytes", AVAILABLE_HELP)
        .core(),
    MetricDef::gauge("client", "llite/*", "kbytesfree", "free_kilobytes", FREE_HELP).core(),
    MetricDef::gauge("client", "llite/*", "kbytestotal", "capacity_kilobytes", CAPACITY_HELP)
        .core(),
    MetricDef::gauge(
        "client",
        "llite/*",
        "checksum_pages",
        "checksum_pages_enabled",
        "Returns 1 if checksums are enabled for pages, else 0",
    ),
    MetricDef::gauge(
        "client",
        "llite/*",
        "max_read_ahead_mb",
        "maximum_read_ahead_megabytes",
        "Maximum number of megabytes to read ahead",
    ),
    MetricDef::gauge(
        "client",
        "llite/*",
        "max_read_ahead_whole_mb",
        "maximum_read_ahead_whole_megabytes",
        "Maximum file size in megabytes for a file to be read in its entirety",
    ),
    MetricDef::gauge(
        "client",
        "llite/*",
        "statahead_max",
        "statahead_maximum",
        "Maximum window size for statahead",
    ),
    MetricDef::gauge(
        "client",
        "llite/*",
        "xattr_cache",
        "xattr_cache_enabled",
        "Returns 1 if extended attribute cache is enabled, else 0",
    ),
    MetricDef::counter("client", "llite/*", "stats", "stats_total", STATS_HELP)
        .core()
        .shape(Shape::Operations),
    MetricDef::counter("client", "llite/*", "stats", "read_samples_total", READ_SAMPLES_HELP)
        .core()
        .shape(io(Read, Samples)),
    MetricDef::gauge("client", "llite/*", "stats", "read_minimum_size_bytes", READ_MIN_HELP)
        .shape(io(Read, Min)),
    MetricDef::gauge("client", "llite/*", "stats", "read_maximum_size_bytes", READ_MAX_HELP)
        .shape(io(Read, Max)),
    MetricDef::counter("client", "llite/*", "stats", "read_bytes_total", READ_TOTAL_HELP)
        .core()
        .shape(io(Read, Sum)),
    MetricDef::counter("client", "llite/*", "stats", "write_samples_total", WRITE_SAMPLES_HELP)
        .core()
        .shape(io(Write, Samples)),
    MetricDef::gauge("client", "llite/*", "stats", "write_minimum_size_bytes", WRITE_MIN_HELP)
        .shape(io(Write, Min)),
    MetricDef::gauge("client", "llite/*", "stats", "write_maximum_size_bytes", WRITE_MAX_HELP)
        .shape(io(Write, Max)),
    MetricDef::counter("client", "llite/*", "stats", "write_bytes_total", WRITE_TOTAL_HELP)
        .core()
        .shape(io(Write, Sum)),
    MetricDef::gauge("client", "mdc/*", "rpc_stats", "rpcs_in_flight", RPCS_IN_FLIGHT_HELP)
        .shape(brw("rpcs in flight")),
    MetricDef::gauge("client", "osc/*", "rpc_stats", "rpcs_in_flight", RPCS_IN_FLIGHT_HELP)
        .shape(brw("rpcs in flight")),
    MetricDef::counter("client", "osc/*", "rpc_stats", "pages_per_rpc_total", PAGES_PER_RPC_HELP)
        .shape(brw("pages per rpc")),
];

/// Entries below `<proc>/sys/lnet`
pub static PROCSYS_METRICS: &[MetricDef] = &[
    MetricDef::gauge(
        "lnet",
        "",
        "catastrophe",
        "catastrophe_enabled",
        "Returns 1 if currently in catastrophe mode",
    )
    .core(),
    MetricDef::gauge(
        "lnet",
        "",
        "console_backoff",
        "console_backoff_enabled",
        "Returns non-zero number if console_backoff is enabled",
    ),
    MetricDef::gauge(
        "lnet",
        "",
        "console_max_delay_centisecs",
        "console_max_delay_centiseconds",
        "Maximum time in centiseconds to wait between messages",
    ),
    MetricDef::gauge(
        "lnet",
        "",
        "console_min_delay_centisecs",
        "console_min_delay_centiseconds",
        "Minimum time in centiseconds to wait between messages",
    ),
    MetricDef::gauge(
        "lnet",
        "",
        "console_ratelimit",
        "console_ratelimit_enabled",
        "Returns 1 if the console message rate limiting is enabled",
    ),
    MetricDef::gauge(
        "lnet",
        "",
        "debug_mb",
        "debug_megabytes",
        "Maximum buffer size in megabytes for the LNET debug messages",
    ),
    MetricDef::gauge(
        "lnet",
        "",
        "lnet_memused",
        "lnet_memory_used_bytes",
        "Number of bytes allocated by LNET",
    )
    .core(),
    MetricDef::gauge(
        "lnet",
        "",
        "panic_on_lbug",
        "panic_on_lbug_enabled",
        "Returns 1 if panic_on_lbug is enabled",
    ),
    MetricDef::gauge(
        "lnet",
        "",
        "watchdog_ratelimit",
        "watchdog_ratelimit_enabled",
        "Returns 1 if the watchdog rate limiter is enabled",
    ),
    MetricDef::gauge("lnet", "", "stats", "allocated", "Number of messages currently allocated")
        .core()
        .shape(Shape::LnetStats { index: 0 }),
    MetricDef::gauge(
        "lnet",
        "",
        "stats",
        "maximum",
        "Maximum number of outstanding messages",
    )
    .shape(Shape::LnetStats { index: 1 }),
    MetricDef::counter("lnet", "", "stats", "errors_total", "Total number of errors")
        .core()
        .shape(Shape::LnetStats { index: 2 }),
    MetricDef::counter(
        "lnet",
        "",
        "stats",
        "send_count_total",
        "Total number of messages that have been sent",
    )
    .core()
    .shape(Shape::LnetStats { index: 3 }),
    MetricDef::counter(
        "lnet",
        "",
        "stats",
        "receive_count_total",
        "Total number of messages that have been received",
    )
    .core()
    .shape(Shape::LnetStats { index: 4 }),
    MetricDef::counter(
        "lnet",
        "",
        "stats",
        "route_count_total",
        "Total number of messages that have been routed",
    )
    .shape(Shape::LnetStats { index: 5 }),
    MetricDef::counter(
        "lnet",
        "",
        "stats",
        "drop_count_total",
        "Total number of messages that have been dropped",
    )
    .shape(Shape::LnetStats { index: 6 }),
    MetricDef::counter(
        "lnet",
        "",
        "stats",
        "send_bytes_total",
        "Total number of bytes that have been sent",
    )
    .core()
    .shape(Shape::LnetStats { index: 7 }),
    MetricDef::counter(
        "lnet",
        "",
        "stats",
        "receive_bytes_total",
        "Total number of bytes that have been received",
    )
    .core()
    .shape(Shape::LnetStats { index: 8 }),
    MetricDef::counter(
        "lnet",
        "",
        "stats",
        "route_bytes_total",
        "Total number of bytes for routed messages",
    )
    .shape(Shape::LnetStats { index: 9 }),
    MetricDef::counter(
        "lnet",
        "",
        "stats",
        "drop_bytes_total",
        "Total number of bytes that have been dropped",
    )
    .shape(Shape::LnetStats { index: 10 }),
];

/// Entries below `<sys>/fs/lustre`
pub static SYSFS_METRICS: &[MetricDef] = &[
    MetricDef::gauge(
        "health",
        "",
        "health_check",
        "health_check",
        "Current health status for the indicated instance: 1 refers to 'healthy', 0 refers to 'unhealthy'",
    )
    .core()
    .shape(Shape::Health),
    MetricDef::gauge(
        "generic",
        "",
        "memused",
        "memory_used_bytes",
        "Bytes of memory currently used by Lustre",
    )
    .core(),
    MetricDef::gauge(
        "generic",
        "",
        "memused_max",
        "memory_used_max_bytes",
        "Largest number of bytes of memory used by Lustre so far",
    ),
    MetricDef::gauge(
        "generic",
        "",
        "max_dirty_mb",
        "maximum_dirty_megabytes",
        "Maximum amount of dirty data in megabytes a client may hold",
    ),
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn all() -> impl Iterator<Item = &'static MetricDef> {
        PROCFS_METRICS
            .iter()
            .chain(PROCSYS_METRICS)
            .chain(SYSFS_METRICS)
    }

    #[test]
    fn test_help_and_kind_fixed_per_name() {
        let mut seen: HashMap<&str, (&str, MetricKind)> = HashMap::new();
        for def in all() {
            let entry = seen.entry(def.name).or_insert((def.help, def.kind));
            assert_eq!(*entry, (def.help, def.kind), "{} varies", def.name);
        }
    }

    #[test]
    fn test_entries_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for def in all() {
            assert!(
                seen.insert((def.component, def.path, def.file, def.name)),
                "{} listed twice for {}",
                def.name,
                def.component
            );
        }
    }

    #[test]
    fn test_catalogue_levels() {
        assert!(all().all(|d| d.level != MetricLevel::Disabled));
        assert!(all().any(|d| d.level == MetricLevel::Core));
        assert!(all().any(|d| d.level == MetricLevel::Extended));
    }

    #[test]
    fn test_pattern() {
        let root = PathBuf::from("/proc/fs/lustre");
        let def = &PROCFS_METRICS[0];
        assert_eq!(def.pattern(&root), "/proc/fs/lustre/obdfilter/*/blocksize");
        assert_eq!(def.full_name(), "lustre_blocksize_bytes");
        assert_eq!(def.depth(), 0);

        let lnet = &PROCSYS_METRICS[0];
        assert_eq!(
            lnet.pattern(&PathBuf::from("/proc/sys/lnet/")),
            "/proc/sys/lnet/catastrophe"
        );
    }

    #[test]
    fn test_pattern_escapes_root() {
        let def = &PROCFS_METRICS[0];
        assert_eq!(
            def.pattern(&PathBuf::from("/tmp/a[1]")),
            "/tmp/a[[]1[]]/obdfilter/*/blocksize"
        );
    }

    #[test]
    fn test_label_names() {
        assert_eq!(
            Shape::JobOperations.label_names(),
            &["component", "target", "jobid", "operation"]
        );
        assert_eq!(
            Shape::Histogram { heading: "x" }.label_names(),
            &["component", "target", "operation", "size"]
        );
    }
}
