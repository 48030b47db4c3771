//! Exporter configuration
//!
//! Layers, lowest precedence first: built-in defaults, an optional TOML file,
//! `LUSTRE_EXPORTER_*` environment variables, command-line flags.

use anyhow::{Context, Result};
use clap::Parser;
use exporter_lib::collector::DEFAULT_SOURCES;
use exporter_lib::config::{DEFAULT_MAX_WORKERS, DEFAULT_SHELF_LIFE};
use exporter_lib::{CollectMode, CollectorConfig, SchedulerConfig};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const ENV_PREFIX: &str = "LUSTRE_EXPORTER";
const LEVELS: [&str; 3] = ["extended", "core", "disabled"];

/// Prometheus exporter for Lustre filesystem statistics
#[derive(Debug, Default, Parser)]
#[command(name = "lustre-exporter")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// TOML configuration file
    #[arg(long, env = "LUSTRE_EXPORTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to use to expose Lustre metrics
    #[arg(long = "web.listen-address")]
    pub listen_address: Option<String>,

    /// Path to use to expose Lustre metrics
    #[arg(long = "web.telemetry-path")]
    pub telemetry_path: Option<String>,

    /// Path to collect data from proc
    #[arg(long = "collector.path.proc")]
    pub proc_path: Option<PathBuf>,

    /// Path to collect data from sys
    #[arg(long = "collector.path.sys")]
    pub sys_path: Option<PathBuf>,

    /// Comma-separated metric sources to enable
    #[arg(long = "collector.sources", value_delimiter = ',')]
    pub sources: Option<Vec<String>>,

    /// Collect version: `v2` coalesces scrapes, anything else runs a pass per scrape
    #[arg(long = "collector.collect.ver")]
    pub collect_version: Option<String>,

    /// Max collecting workers running at the same time
    #[arg(long = "collector.v2.workers")]
    pub max_workers: Option<usize>,

    /// Data shelf life, no repeated collection during the shelf life
    #[arg(long = "collector.v2.shelflife")]
    pub shelf_life: Option<String>,

    /// OST metric level
    #[arg(long = "collector.ost", value_parser = LEVELS)]
    pub ost: Option<String>,

    /// MDT metric level
    #[arg(long = "collector.mdt", value_parser = LEVELS)]
    pub mdt: Option<String>,

    /// MGS metric level
    #[arg(long = "collector.mgs", value_parser = LEVELS)]
    pub mgs: Option<String>,

    /// MDS metric level
    #[arg(long = "collector.mds", value_parser = LEVELS)]
    pub mds: Option<String>,

    /// Client metric level
    #[arg(long = "collector.client", value_parser = LEVELS)]
    pub client: Option<String>,

    /// Generic metric level
    #[arg(long = "collector.generic", value_parser = LEVELS)]
    pub generic: Option<String>,

    /// LNET metric level
    #[arg(long = "collector.lnet", value_parser = LEVELS)]
    pub lnet: Option<String>,

    /// Health metric level
    #[arg(long = "collector.health", value_parser = LEVELS)]
    pub health: Option<String>,
}

impl Cli {
    /// Flag values as configuration keys, for the flags that were given
    fn overrides(&self) -> Vec<(&'static str, config::Value)> {
        let mut overrides: Vec<(&'static str, config::Value)> = Vec::new();
        let mut push = |key: &'static str, value: Option<config::Value>| {
            if let Some(value) = value {
                overrides.push((key, value));
            }
        };
        let path = |p: &Option<PathBuf>| -> Option<config::Value> {
            p.as_ref()
                .map(|p| config::Value::from(p.to_string_lossy().into_owned()))
        };
        let text = |s: &Option<String>| -> Option<config::Value> {
            s.clone().map(config::Value::from)
        };

        push("listen_address", text(&self.listen_address));
        push("telemetry_path", text(&self.telemetry_path));
        push("collector.proc_path", path(&self.proc_path));
        push("collector.sys_path", path(&self.sys_path));
        push("sources", self.sources.clone().map(config::Value::from));
        push("collect_version", text(&self.collect_version));
        push(
            "max_workers",
            self.max_workers.map(|n| config::Value::from(n as i64)),
        );
        push("shelf_life", text(&self.shelf_life));
        push("collector.levels.ost", text(&self.ost));
        push("collector.levels.mdt", text(&self.mdt));
        push("collector.levels.mgs", text(&self.mgs));
        push("collector.levels.mds", text(&self.mds));
        push("collector.levels.client", text(&self.client));
        push("collector.levels.generic", text(&self.generic));
        push("collector.levels.lnet", text(&self.lnet));
        push("collector.levels.health", text(&self.health));
        overrides
    }
}

/// Exporter configuration, immutable after startup
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    /// `host:port`; an empty host binds every interface
    pub listen_address: String,

    /// Path serving the text exposition
    pub telemetry_path: String,

    /// Enabled metric sources
    pub sources: Vec<String>,

    /// `v2` for the coalescing scheduler
    pub collect_version: String,

    /// Passes allowed to run at once in `v2`
    pub max_workers: usize,

    /// Window during which a completed pass is replayed
    #[serde(with = "humantime_serde")]
    pub shelf_life: Duration,

    /// Roots and per-component levels
    pub collector: CollectorConfig,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            listen_address: ":9169".to_string(),
            telemetry_path: "/metrics".to_string(),
            sources: DEFAULT_SOURCES.iter().map(|s| s.to_string()).collect(),
            collect_version: CollectMode::V2.as_str().to_string(),
            max_workers: DEFAULT_MAX_WORKERS,
            shelf_life: DEFAULT_SHELF_LIFE,
            collector: CollectorConfig::default(),
        }
    }
}

impl ExporterConfig {
    /// Load configuration from every layer
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = &cli.config {
            builder = builder.add_source(
                config::File::from(path.as_path()).format(config::FileFormat::Toml),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("sources")
                .try_parsing(true),
        );

        for (key, value) in cli.overrides() {
            builder = builder.set_override(key, value)?;
        }

        let config: ExporterConfig = builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !self.telemetry_path.starts_with('/') {
            anyhow::bail!(
                "Telemetry path must start with '/': {}",
                self.telemetry_path
            );
        }
        if matches!(self.telemetry_path.as_str(), "/" | "/healthz" | "/readyz") {
            anyhow::bail!(
                "Telemetry path collides with a built-in route: {}",
                self.telemetry_path
            );
        }
        if self.sources.is_empty() {
            anyhow::bail!("At least one metric source must be enabled");
        }
        Ok(())
    }

    pub fn collect_mode(&self) -> CollectMode {
        CollectMode::from_version(&self.collect_version)
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            mode: self.collect_mode(),
            max_workers: self.max_workers,
            shelf_life: self.shelf_life,
        }
        .normalized()
    }

    /// Listen address with an empty host expanded to every interface
    pub fn bind_address(&self) -> String {
        if self.listen_address.starts_with(':') {
            format!("0.0.0.0{}", self.listen_address)
        } else {
            self.listen_address.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exporter_lib::MetricLevel;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = ExporterConfig::load(&Cli::default()).unwrap();

        assert_eq!(config.listen_address, ":9169");
        assert_eq!(config.bind_address(), "0.0.0.0:9169");
        assert_eq!(config.telemetry_path, "/metrics");
        assert_eq!(config.sources, vec!["procfs", "procsys", "sysfs"]);
        assert_eq!(config.collector.proc_path, PathBuf::from("/proc"));

        let scheduler = config.scheduler_config();
        assert_eq!(scheduler.mode, CollectMode::V2);
        assert_eq!(scheduler.max_workers, 4);
        assert_eq!(scheduler.shelf_life, Duration::from_secs(1));
    }

    #[test]
    fn test_flags_parse_with_dotted_names() {
        let cli = Cli::parse_from([
            "lustre-exporter",
            "--collector.path.proc=/tmp/proc",
            "--collector.collect.ver=v1",
            "--collector.v2.workers=8",
            "--collector.v2.shelflife=500ms",
            "--collector.ost=core",
            "--collector.lnet=disabled",
            "--collector.sources=procfs,sysfs",
            "--web.listen-address=127.0.0.1:9000",
        ]);
        let config = ExporterConfig::load(&cli).unwrap();

        assert_eq!(config.collector.proc_path, PathBuf::from("/tmp/proc"));
        assert_eq!(config.collect_mode(), CollectMode::V1);
        assert_eq!(config.max_workers, 8);
        assert_eq!(config.shelf_life, Duration::from_millis(500));
        assert_eq!(config.collector.levels.ost, MetricLevel::Core);
        assert_eq!(config.collector.levels.lnet, MetricLevel::Disabled);
        assert_eq!(config.collector.levels.mdt, MetricLevel::Extended);
        assert_eq!(config.sources, vec!["procfs", "sysfs"]);
        assert_eq!(config.bind_address(), "127.0.0.1:9000");
    }

    #[test]
    fn test_rejects_unknown_level() {
        let result = Cli::try_parse_from(["lustre-exporter", "--collector.ost=verbose"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_file_layer_and_flag_precedence() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            r#"
telemetry_path = "/lustre"
max_workers = 2
shelf_life = "250ms"

[collector]
sys_path = "/tmp/sys"

[collector.levels]
client = "disabled"
"#
        )
        .unwrap();

        let cli = Cli {
            config: Some(file.path().to_path_buf()),
            max_workers: Some(6),
            ..Cli::default()
        };
        let config = ExporterConfig::load(&cli).unwrap();

        assert_eq!(config.telemetry_path, "/lustre");
        assert_eq!(config.shelf_life, Duration::from_millis(250));
        assert_eq!(config.max_workers, 6);
        assert_eq!(config.collector.sys_path, PathBuf::from("/tmp/sys"));
        assert_eq!(config.collector.proc_path, PathBuf::from("/proc"));
        assert_eq!(config.collector.levels.client, MetricLevel::Disabled);
    }

    #[test]
    fn test_zero_workers_fall_back_to_default() {
        let cli = Cli {
            max_workers: Some(0),
            ..Cli::default()
        };
        let config = ExporterConfig::load(&cli).unwrap();
        assert_eq!(config.scheduler_config().max_workers, DEFAULT_MAX_WORKERS);
    }

    #[test]
    fn test_invalid_telemetry_path() {
        let cli = Cli {
            telemetry_path: Some("metrics".to_string()),
            ..Cli::default()
        };
        assert!(ExporterConfig::load(&cli).is_err());

        let cli = Cli {
            telemetry_path: Some("/healthz".to_string()),
            ..Cli::default()
        };
        assert!(ExporterConfig::load(&cli).is_err());
    }
}
