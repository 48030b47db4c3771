//! Core data models for the exporter

use serde::{Deserialize, Serialize};
use std::fmt;

/// Prometheus type of an exported series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
    Untyped,
}

/// One label name/value pair
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub value: String,
}

impl Label {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One observation emitted by a collection pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub name: String,
    pub help: String,
    pub kind: MetricKind,
    pub labels: Vec<Label>,
    pub value: f64,
}

impl MetricSample {
    pub fn new(
        kind: MetricKind,
        name: impl Into<String>,
        help: impl Into<String>,
        labels: Vec<Label>,
        value: f64,
    ) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            kind,
            labels,
            value,
        }
    }

    /// Look up a label value by name
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.value.as_str())
    }

    /// Identity of the series: name plus label set sorted by label name
    pub fn series_key(&self) -> SeriesKey {
        let mut labels = self.labels.clone();
        labels.sort();
        SeriesKey {
            name: self.name.clone(),
            labels,
        }
    }
}

/// Identity of a time series within one collection pass
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesKey {
    pub name: String,
    pub labels: Vec<Label>,
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.name)?;
        for (i, label) in self.labels.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}=\"{}\"", label.name, label.value)?;
        }
        write!(f, "}}")
    }
}

/// Result of one source within a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceResult {
    Success,
    Error,
}

impl SourceResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceResult::Success => "success",
            SourceResult::Error => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_key_ignores_label_order() {
        let a = MetricSample::new(
            MetricKind::Counter,
            "lustre_stats_total",
            "help",
            vec![Label::new("target", "t0"), Label::new("operation", "ping")],
            1.0,
        );
        let b = MetricSample::new(
            MetricKind::Counter,
            "lustre_stats_total",
            "help",
            vec![Label::new("operation", "ping"), Label::new("target", "t0")],
            2.0,
        );

        assert_eq!(a.series_key(), b.series_key());
        assert_eq!(
            a.series_key().to_string(),
            "lustre_stats_total{operation=\"ping\",target=\"t0\"}"
        );
    }

    #[test]
    fn test_label_lookup() {
        let sample = MetricSample::new(
            MetricKind::Gauge,
            "lustre_blocksize_bytes",
            "help",
            vec![Label::new("component", "ost")],
            4096.0,
        );
        assert_eq!(sample.label("component"), Some("ost"));
        assert_eq!(sample.label("target"), None);
    }
}
