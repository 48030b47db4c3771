//! Error types for collection and parsing

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Failure to extract numbers from a statistics file
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("invalid number {token:?}: {source}")]
    InvalidNumber {
        token: String,
        #[source]
        source: std::num::ParseFloatError,
    },

    #[error("invalid integer {token:?} for key {key}")]
    InvalidInteger { key: String, token: String },

    #[error("no numeric value found for {key}")]
    MissingValue { key: String },

    #[error("expected {expected} values for {key}, found {found}")]
    TooFewValues {
        key: String,
        expected: usize,
        found: usize,
    },

    #[error("job_id not found in block starting with {line:?}")]
    MissingJobId { line: String },

    #[error("path {0} has too few elements to name a target")]
    ShortPath(String),
}

/// Failure of one source within a collection pass
#[derive(Debug, Clone, Error)]
pub enum CollectError {
    #[error("invalid glob pattern {pattern}: {message}")]
    Pattern { pattern: String, message: String },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },

    #[error("series {series} already parsed in this pass")]
    DuplicateSeries { series: String },

    #[error("collection task failed: {0}")]
    Task(String),
}

impl CollectError {
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CollectError::Read {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    pub fn parse(path: impl Into<PathBuf>, source: ParseError) -> Self {
        CollectError::Parse {
            path: path.into(),
            source,
        }
    }
}

/// Failure to build the configured sources at startup
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("unknown metric source {0:?} (known: procfs, procsys, sysfs)")]
    UnknownSource(String),

    #[error("metric source {0:?} listed twice")]
    DuplicateSource(String),
}
