//! Conversion of samples into Prometheus metric families

use crate::models::{MetricKind, MetricSample};
use prometheus::proto::{Counter, Gauge, LabelPair, Metric, MetricFamily, MetricType, Untyped};
use prometheus::{Encoder, TextEncoder};
use std::collections::HashMap;

/// Group samples by name, keeping the order in which names first appear
///
/// Help and type come from the first sample of each name.
pub fn metric_families(samples: &[MetricSample]) -> Vec<MetricFamily> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut grouped: Vec<(&MetricSample, Vec<Metric>)> = Vec::new();

    for sample in samples {
        let slot = *index.entry(sample.name.as_str()).or_insert_with(|| {
            grouped.push((sample, Vec::new()));
            grouped.len() - 1
        });
        grouped[slot].1.push(to_metric(sample));
    }

    grouped
        .into_iter()
        .map(|(first, metrics)| {
            let mut family = MetricFamily::default();
            family.set_name(first.name.clone());
            family.set_help(first.help.clone());
            family.set_field_type(match first.kind {
                MetricKind::Counter => MetricType::COUNTER,
                MetricKind::Gauge => MetricType::GAUGE,
                MetricKind::Untyped => MetricType::UNTYPED,
            });
            family.set_metric(metrics.into());
            family
        })
        .collect()
}

fn to_metric(sample: &MetricSample) -> Metric {
    let labels: Vec<LabelPair> = sample
        .labels
        .iter()
        .map(|l| {
            let mut pair = LabelPair::default();
            pair.set_name(l.name.clone());
            pair.set_value(l.value.clone());
            pair
        })
        .collect();

    let mut metric = Metric::default();
    metric.set_label(labels.into());
    match sample.kind {
        MetricKind::Counter => {
            let mut counter = Counter::default();
            counter.set_value(sample.value);
            metric.set_counter(counter);
        }
        MetricKind::Gauge => {
            let mut gauge = Gauge::default();
            gauge.set_value(sample.value);
            metric.set_gauge(gauge);
        }
        MetricKind::Untyped => {
            let mut untyped = Untyped::default();
            untyped.set_value(sample.value);
            metric.set_untyped(untyped);
        }
    }
    metric
}

/// Render families in the text exposition format
///
/// Families without metrics are skipped.
pub fn encode_text(families: &[MetricFamily]) -> Result<(String, String), prometheus::Error> {
    let families: Vec<MetricFamily> = families
        .iter()
        .filter(|f| !f.get_metric().is_empty())
        .cloned()
        .collect();

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&families, &mut buffer)?;
    let body = String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))?;
    Ok((encoder.format_type().to_string(), body))
}
