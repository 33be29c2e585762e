//! Score arithmetic for dimension metrics.
//!
//! All scores live in `[0, 1]`. A dimension missing from a sample's metrics
//! is absent, not zero: it is excluded from every mean it would otherwise
//! participate in.

use std::collections::BTreeMap;

use crate::config::DimensionConfig;

/// Mapping from dimension name to a score in `[0, 1]`.
pub type MetricScores = BTreeMap<String, f64>;

/// Clamps a raw judge value into `[0, 1]`.
///
/// Non-finite values collapse to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Weighted mean over the dimensions present in `metrics`.
///
/// Only dimensions that appear in both `metrics` and `dimensions`
/// contribute. Returns 0 when nothing contributes or the contributing
/// weight sums to zero.
pub fn weighted_overall(
    metrics: &MetricScores,
    dimensions: &BTreeMap<String, DimensionConfig>,
) -> f64 {
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;

    for (name, config) in dimensions {
        if let Some(value) = metrics.get(name) {
            weighted_sum += config.weight * value;
            weight_total += config.weight;
        }
    }

    if weight_total > 0.0 {
        clamp_unit(weighted_sum / weight_total)
    } else {
        0.0
    }
}

/// Per-dimension arithmetic mean across samples, over samples where the
/// dimension is present.
pub fn aggregate_metrics(per_sample: &[MetricScores]) -> MetricScores {
    let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();

    for metrics in per_sample {
        for (name, value) in metrics {
            let entry = sums.entry(name.clone()).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }
    }

    sums.into_iter()
        .map(|(name, (sum, count))| (name, sum / count as f64))
        .collect()
}

/// Arithmetic mean; 0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
