//! Consistency scoring.
//!
//! Valid (colored) responses are grouped by stimulus. Every item with at least
//! two valid responses contributes all of its pairwise RGB distances to one
//! pooled list; the verdict compares the pooled mean to the configured cutoff.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use syntest_types::{ConsistencySummary, ItemConsistency, Rgb, StimulusId, TrialResponse};

use crate::EngineError;

/// What to do with items that never reached two valid responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsufficientItemPolicy {
    /// Flag the item and leave it out of the pool.
    #[default]
    Exclude,
    /// Any flagged item fails the whole session.
    #[serde(alias = "fail")]
    FailSession,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringConfig {
    cutoff: f64,
    policy: InsufficientItemPolicy,
}

impl ScoringConfig {
    pub fn new(cutoff: f64) -> Result<Self, EngineError> {
        if !cutoff.is_finite() || cutoff <= 0.0 {
            return Err(EngineError::invalid(format!(
                "scoring cutoff must be a positive number, got {cutoff}"
            )));
        }
        Ok(Self {
            cutoff,
            policy: InsufficientItemPolicy::default(),
        })
    }

    #[must_use]
    pub fn with_policy(mut self, policy: InsufficientItemPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    #[must_use]
    pub fn policy(&self) -> InsufficientItemPolicy {
        self.policy
    }
}

#[derive(Default)]
struct ItemAccumulator<'a> {
    first: Option<&'a TrialResponse>,
    colors: Vec<Rgb>,
    none: usize,
}

#[must_use]
pub fn score(responses: &[TrialResponse], config: &ScoringConfig) -> ConsistencySummary {
    let mut items: BTreeMap<StimulusId, ItemAccumulator<'_>> = BTreeMap::new();
    for response in responses {
        let entry = items.entry(response.step.stimulus_id).or_default();
        entry.first.get_or_insert(response);
        match response.color() {
            Some(color) => entry.colors.push(color),
            None => entry.none += 1,
        }
    }

    let mut pooled = Vec::new();
    let mut per_item = Vec::with_capacity(items.len());
    for (stimulus_id, acc) in items {
        let Some(first) = acc.first else { continue };
        let distances = pairwise_distances(&acc.colors);
        let mean_distance = mean(&distances);
        pooled.extend_from_slice(&distances);
        per_item.push(ItemConsistency {
            stimulus_id,
            label: first.step.label.clone(),
            valid_responses: acc.colors.len(),
            none_responses: acc.none,
            mean_distance,
            mean_color: Rgb::mean(&acc.colors),
        });
    }

    let overall_mean = mean(&pooled).unwrap_or(0.0);
    let overall_sd = population_sd(&pooled, overall_mean);
    let median_distance = median(&mut pooled);

    let none_count = responses.iter().filter(|r| r.is_none()).count();
    let none_fraction = ratio(none_count, responses.len());
    let mean_reaction_time_ms = if responses.is_empty() {
        0.0
    } else {
        responses.iter().map(|r| r.reaction_time_ms as f64).sum::<f64>() / responses.len() as f64
    };

    let any_insufficient = per_item.iter().any(ItemConsistency::is_insufficient);
    let policy_ok = !(config.policy == InsufficientItemPolicy::FailSession && any_insufficient);
    let pass = !pooled.is_empty() && overall_mean < config.cutoff && policy_ok;

    tracing::debug!(
        items = per_item.len(),
        pairs = pooled.len(),
        overall_mean,
        overall_sd,
        pass,
        "Scored consistency responses"
    );

    ConsistencySummary {
        per_item,
        overall_mean,
        overall_sd,
        median_distance,
        pair_count: pooled.len(),
        cutoff: config.cutoff,
        none_fraction,
        mean_reaction_time_ms,
        pass,
    }
}

fn pairwise_distances(colors: &[Rgb]) -> Vec<f64> {
    let mut out = Vec::new();
    for (i, a) in colors.iter().enumerate() {
        for b in &colors[i + 1..] {
            out.push(a.distance(*b));
        }
    }
    out
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

fn population_sd(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}
