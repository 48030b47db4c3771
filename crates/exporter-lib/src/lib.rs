//! Exporter library for Lustre filesystem statistics
//!
//! This crate provides the core functionality for:
//! - Reading and parsing Lustre proc/sysfs statistics files
//! - Coalescing concurrent scrapes onto shared collection passes
//! - Converting samples to Prometheus metric families
//! - Health checks and observability

pub mod collector;
pub mod config;
pub mod error;
pub mod exposition;
pub mod health;
pub mod models;
pub mod observability;
pub mod scheduler;

pub use config::{CollectMode, CollectorConfig, ComponentLevels, MetricLevel, SchedulerConfig};
pub use error::{CollectError, ParseError, RegistryError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ExporterMetrics, ScrapeDurations, StructuredLogger};
pub use scheduler::{Scheduler, SchedulerBuilder};

/// Prefix shared by every exported metric name
pub const NAMESPACE: &str = "lustre";
