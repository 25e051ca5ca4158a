// ==============================================================================
// aggregate.rs - Aggregation & Statistics Engine
// ==============================================================================
// Description: Groups extracted values by condition, genotype class and ancestry
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================
// Quartiles use rank selection without interpolation:
//   q(p) = sorted[min(floor(n * p), n - 1)]
// Only counts and rank statistics are emitted; per-sample values and donor
// identifiers never leave this module.
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{ByCondition, ByGenotype, ExtractedValue, TrackReference};

/// Five-number rank summary of one group
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub min: f64,
    pub quartile_1: f64,
    pub median: f64,
    pub quartile_3: f64,
    pub max: f64,
}

impl Stats {
    /// Summary of an unsorted sample; `None` when empty
    pub fn describe(values: &[f64]) -> Option<Self> {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(f64::total_cmp);

        Some(Self {
            min: sorted[0],
            quartile_1: rank_quantile(&sorted, 0.25),
            median: rank_quantile(&sorted, 0.5),
            quartile_3: rank_quantile(&sorted, 0.75),
            max: sorted[sorted.len() - 1],
        })
    }
}

/// Element at rank `floor(n * q)` of a sorted, non-empty slice
fn rank_quantile(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    let index = ((n as f64) * q).floor() as usize;
    sorted[index.min(n - 1)]
}

/// Statistics for one (condition, genotype class) bucket
///
/// Empty buckets serialize with `"stats": null` so consumers can tell
/// "no data" apart from "not requested". `failed` counts tracks of the group
/// whose summary could not be computed; a non-zero count marks the group as
/// partial.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub n: usize,
    pub stats: Option<Stats>,
    #[serde(rename = "statsByAncestry")]
    pub stats_by_ancestry: BTreeMap<String, Stats>,
    #[serde(default)]
    pub failed: usize,
}

impl GroupSummary {
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn is_partial(&self) -> bool {
        self.failed > 0
    }
}

/// condition → genotype class → group summary
pub type PeakStatistics = ByCondition<ByGenotype<GroupSummary>>;

#[derive(Default)]
struct Bucket {
    values: Vec<f64>,
    by_ancestry: BTreeMap<String, Vec<f64>>,
}

/// Two-level grouping of extracted values into rank statistics
pub fn aggregate(values: &[ExtractedValue]) -> PeakStatistics {
    let mut buckets: ByCondition<ByGenotype<Bucket>> = ByCondition::default();

    for extracted in values {
        let track = &extracted.track;
        let bucket = buckets.get_mut(track.condition).get_mut(track.class);

        bucket.values.push(extracted.value);
        bucket
            .by_ancestry
            .entry(track.ancestry.clone())
            .or_default()
            .push(extracted.value);
    }

    buckets.map(|_, by_class| {
        by_class.map(|_, bucket| GroupSummary {
            n: bucket.values.len(),
            stats: Stats::describe(&bucket.values),
            stats_by_ancestry: bucket
                .by_ancestry
                .into_iter()
                .filter_map(|(ancestry, values)| Stats::describe(&values).map(|s| (ancestry, s)))
                .collect(),
            failed: 0,
        })
    })
}

/// Count tracks that failed extraction against their own group only
pub fn record_failures<'a>(
    stats: &mut PeakStatistics,
    failed: impl IntoIterator<Item = &'a TrackReference>,
) {
    for track in failed {
        stats.get_mut(track.condition).get_mut(track.class).failed += 1;
    }
}
