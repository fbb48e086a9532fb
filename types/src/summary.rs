//! Derived consistency results. Computed once per completed testing deck, never mutated.

use serde::{Deserialize, Serialize};

use crate::{NonEmptyString, Rgb, StimulusId};

/// Per-stimulus consistency detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemConsistency {
    pub stimulus_id: StimulusId,
    pub label: NonEmptyString,
    /// Responses that carried a color.
    pub valid_responses: usize,
    /// Responses explicitly marked "no color".
    pub none_responses: usize,
    /// Mean pairwise distance; `None` when fewer than two valid responses exist.
    pub mean_distance: Option<f64>,
    /// Channel-wise mean of the valid responses; the item's established association.
    pub mean_color: Option<Rgb>,
}

impl ItemConsistency {
    /// Items with fewer than two valid responses contribute no distances.
    #[must_use]
    pub fn is_insufficient(&self) -> bool {
        self.valid_responses < 2
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencySummary {
    pub per_item: Vec<ItemConsistency>,
    /// Mean over the pooled pairwise distances of all sufficient items.
    pub overall_mean: f64,
    /// Population standard deviation of the pooled distances.
    pub overall_sd: f64,
    pub median_distance: f64,
    pub pair_count: usize,
    pub cutoff: f64,
    /// Fraction of all responses that were "no color".
    pub none_fraction: f64,
    pub mean_reaction_time_ms: f64,
    pub pass: bool,
}

impl ConsistencySummary {
    /// Mean pairwise distance keyed by stimulus, for items that produced one.
    pub fn per_item_mean_distance(&self) -> impl Iterator<Item = (StimulusId, f64)> + '_ {
        self.per_item
            .iter()
            .filter_map(|item| item.mean_distance.map(|d| (item.stimulus_id, d)))
    }

    /// Items excluded from the pool for lack of valid responses.
    pub fn insufficient_items(&self) -> impl Iterator<Item = &ItemConsistency> + '_ {
        self.per_item.iter().filter(|item| item.is_insufficient())
    }

    /// Number of items with a usable association (two or more valid responses).
    #[must_use]
    pub fn valid_item_count(&self) -> usize {
        self.per_item.iter().filter(|i| !i.is_insufficient()).count()
    }

    /// `1 - min(sd / mean, 1)`: lower spread relative to the mean reads as more consistent.
    ///
    /// `None` when the mean is zero (no pairs, or perfectly identical responses).
    #[must_use]
    pub fn consistency_score(&self) -> Option<f64> {
        (self.overall_mean > 0.0).then(|| 1.0 - (self.overall_sd / self.overall_mean).min(1.0))
    }
}
