//! Collector and scheduler configuration
//!
//! Built once at startup and handed to the source registry and the
//! scheduler. Nothing in the library reads process-wide toggles.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default number of collection passes allowed to run at once
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Default window during which a completed pass is replayed
pub const DEFAULT_SHELF_LIFE: Duration = Duration::from_secs(1);

/// How much of a component's catalogue is exported
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricLevel {
    /// Every metric of the component
    #[default]
    Extended,
    /// Only metrics marked as core
    Core,
    /// Nothing from the component
    Disabled,
}

impl MetricLevel {
    /// Whether a catalogue entry of `entry_level` passes this setting
    pub fn admits(&self, entry_level: MetricLevel) -> bool {
        match self {
            MetricLevel::Disabled => false,
            MetricLevel::Extended => true,
            MetricLevel::Core => entry_level == MetricLevel::Core,
        }
    }
}

/// Per-component export levels
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentLevels {
    pub ost: MetricLevel,
    pub mdt: MetricLevel,
    pub mgs: MetricLevel,
    pub mds: MetricLevel,
    pub client: MetricLevel,
    pub generic: MetricLevel,
    pub lnet: MetricLevel,
    pub health: MetricLevel,
}

impl ComponentLevels {
    /// Level configured for a component tag; unknown tags are disabled
    pub fn level_for(&self, component: &str) -> MetricLevel {
        match component {
            "ost" => self.ost,
            "mdt" => self.mdt,
            "mgs" => self.mgs,
            "mds" => self.mds,
            "client" => self.client,
            "generic" => self.generic,
            "lnet" => self.lnet,
            "health" => self.health,
            _ => MetricLevel::Disabled,
        }
    }
}

/// Filesystem roots and component levels used to build sources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Root of the proc-like tree
    pub proc_path: PathBuf,
    /// Root of the sys-like tree
    pub sys_path: PathBuf,
    /// Export level per component
    pub levels: ComponentLevels,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            proc_path: PathBuf::from("/proc"),
            sys_path: PathBuf::from("/sys"),
            levels: ComponentLevels::default(),
        }
    }
}

/// Scrape handling strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectMode {
    /// One full pass per scrape, no reuse and no cap
    V1,
    /// Coalescing scheduler with bounded workers and result reuse
    #[default]
    V2,
}

impl CollectMode {
    /// Anything other than `v2` selects the legacy mode
    pub fn from_version(version: &str) -> Self {
        if version.trim().eq_ignore_ascii_case("v2") {
            CollectMode::V2
        } else {
            CollectMode::V1
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CollectMode::V1 => "v1",
            CollectMode::V2 => "v2",
        }
    }
}

/// Scheduler tunables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub mode: CollectMode,
    pub max_workers: usize,
    #[serde(with = "humantime_serde")]
    pub shelf_life: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            mode: CollectMode::V2,
            max_workers: DEFAULT_MAX_WORKERS,
            shelf_life: DEFAULT_SHELF_LIFE,
        }
    }
}

impl SchedulerConfig {
    /// Replace a zero worker count with the default
    pub fn normalized(mut self) -> Self {
        if self.max_workers == 0 {
            self.max_workers = DEFAULT_MAX_WORKERS;
        }
        self
    }
}
