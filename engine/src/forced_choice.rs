//! Forced-choice option generation and validated trials.
//!
//! Decoys are found by rejection sampling: draw a random color and keep it only
//! if it is more than `min_distance` away from the target and from every decoy
//! accepted so far. Each decoy gets at most `max_attempts` draws; when the budget
//! runs out the best draw seen (largest nearest-neighbour distance) is used and
//! the set is flagged as degraded.

use std::fmt;
use std::time::Instant;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use syntest_types::{MAX_RGB_DISTANCE, Rgb};

use crate::{EngineError, SourceError};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionId(String);

impl OptionId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub id: OptionId,
    pub color: Rgb,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChoiceQuality {
    Separated,
    /// Retry budget ran out; the closest pair is only this far apart.
    Degraded { achieved_min_distance: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForcedChoiceConfig {
    pub candidates: usize,
    pub min_distance: f64,
    pub max_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct ForcedChoiceGenerator {
    config: ForcedChoiceConfig,
}

/// Target plus decoys in presentation order. Which slot is correct stays private.
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceSet {
    options: Vec<ChoiceOption>,
    correct_slot: usize,
    quality: ChoiceQuality,
}

impl ChoiceSet {
    #[must_use]
    pub fn options(&self) -> &[ChoiceOption] {
        &self.options
    }

    #[must_use]
    pub fn quality(&self) -> ChoiceQuality {
        self.quality
    }

    #[must_use]
    pub fn is_correct(&self, id: &OptionId) -> bool {
        self.options
            .get(self.correct_slot)
            .is_some_and(|option| &option.id == id)
    }

    pub(crate) fn into_options(self) -> Vec<ChoiceOption> {
        self.options
    }
}

/// Smallest distance between any two options.
#[must_use]
pub fn min_pairwise_distance(options: &[ChoiceOption]) -> f64 {
    let mut min = f64::INFINITY;
    for (i, a) in options.iter().enumerate() {
        for b in &options[i + 1..] {
            min = min.min(a.color.distance(b.color));
        }
    }
    min
}

impl ForcedChoiceGenerator {
    pub fn new(config: ForcedChoiceConfig) -> Result<Self, EngineError> {
        if config.candidates < 2 {
            return Err(EngineError::invalid(format!(
                "forced choice needs at least 2 candidates, got {}",
                config.candidates
            )));
        }
        if !config.min_distance.is_finite()
            || config.min_distance <= 0.0
            || config.min_distance > MAX_RGB_DISTANCE
        {
            return Err(EngineError::invalid(format!(
                "forced choice min_distance must be within (0, {MAX_RGB_DISTANCE:.1}], got {}",
                config.min_distance
            )));
        }
        if config.max_attempts == 0 {
            return Err(EngineError::invalid(
                "forced choice max_attempts must be positive",
            ));
        }
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &ForcedChoiceConfig {
        &self.config
    }

    pub fn generate<R: Rng + ?Sized>(&self, target: Rgb, rng: &mut R) -> ChoiceSet {
        let min_distance = self.config.min_distance;
        let mut accepted = vec![target];
        let mut worst_fallback: Option<f64> = None;

        for _ in 1..self.config.candidates {
            let first = random_color(rng);
            let mut best = (first, nearest(&accepted, first));
            let mut attempts = 1;
            while !separated(best.1, min_distance) && attempts < self.config.max_attempts {
                let candidate = random_color(rng);
                let distance = nearest(&accepted, candidate);
                if distance > best.1 {
                    best = (candidate, distance);
                }
                attempts += 1;
            }
            if !separated(best.1, min_distance) {
                worst_fallback = Some(worst_fallback.map_or(best.1, |w: f64| w.min(best.1)));
            }
            accepted.push(best.0);
        }

        let quality = match worst_fallback {
            None => ChoiceQuality::Separated,
            Some(achieved_min_distance) => {
                tracing::warn!(
                    target = %target,
                    achieved_min_distance,
                    min_distance,
                    "Forced-choice decoy budget exhausted; using best candidate"
                );
                ChoiceQuality::Degraded {
                    achieved_min_distance,
                }
            }
        };

        let mut order: Vec<usize> = (0..accepted.len()).collect();
        order.shuffle(rng);
        let correct_slot = order.iter().position(|&i| i == 0).unwrap_or(0);
        let options = order
            .into_iter()
            .enumerate()
            .map(|(slot, i)| ChoiceOption {
                id: OptionId::new(format!("opt{slot}")),
                color: accepted[i],
            })
            .collect();

        ChoiceSet {
            options,
            correct_slot,
            quality,
        }
    }
}

fn random_color<R: Rng + ?Sized>(rng: &mut R) -> Rgb {
    Rgb::new(rng.random(), rng.random(), rng.random())
}

/// Two colors are distinct only when strictly farther apart than the threshold.
fn separated(distance: f64, min_distance: f64) -> bool {
    distance > min_distance
}

fn nearest(accepted: &[Rgb], candidate: Rgb) -> f64 {
    accepted
        .iter()
        .map(|c| c.distance(candidate))
        .fold(f64::INFINITY, f64::min)
}

/// What a trial source hands back for one forced-choice trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialDescriptor {
    pub id: String,
    pub target_trigger: String,
    pub options: Vec<ChoiceOption>,
    pub expected_color: Rgb,
    pub trial_index: usize,
    pub total_trials: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NextTrial {
    Trial(TrialDescriptor),
    /// No further target associations remain.
    Done,
}

/// A validated forced-choice trial: exactly one option carries the expected color.
///
/// Options closer together than the session's minimum distance do not reject
/// the trial; it is kept and reported as [`ChoiceQuality::Degraded`].
#[derive(Debug, Clone, PartialEq)]
pub struct ForcedChoiceTrial {
    id: String,
    trigger: String,
    expected: Rgb,
    options: Vec<ChoiceOption>,
    correct_slot: usize,
    quality: ChoiceQuality,
    trial_index: usize,
    total_trials: usize,
    revealed_at: Option<Instant>,
}

impl ForcedChoiceTrial {
    pub fn from_descriptor(
        descriptor: TrialDescriptor,
        min_distance: f64,
    ) -> Result<Self, SourceError> {
        let mut matches = descriptor
            .options
            .iter()
            .enumerate()
            .filter(|(_, option)| option.color == descriptor.expected_color)
            .map(|(slot, _)| slot);
        let correct_slot = match (matches.next(), matches.next()) {
            (Some(slot), None) => slot,
            (None, _) => {
                return Err(SourceError::InvalidTrial(format!(
                    "trial {} has no option with the expected color",
                    descriptor.id
                )));
            }
            (Some(_), Some(_)) => {
                return Err(SourceError::InvalidTrial(format!(
                    "trial {} has more than one option with the expected color",
                    descriptor.id
                )));
            }
        };
        let closest = min_pairwise_distance(&descriptor.options);
        let quality = if descriptor.options.len() < 2 || separated(closest, min_distance) {
            ChoiceQuality::Separated
        } else {
            tracing::warn!(
                trial_id = %descriptor.id,
                achieved_min_distance = closest,
                min_distance,
                "Forced-choice trial options are not separated"
            );
            ChoiceQuality::Degraded {
                achieved_min_distance: closest,
            }
        };
        Ok(Self {
            id: descriptor.id,
            trigger: descriptor.target_trigger,
            expected: descriptor.expected_color,
            options: descriptor.options,
            correct_slot,
            quality,
            trial_index: descriptor.trial_index,
            total_trials: descriptor.total_trials,
            revealed_at: None,
        })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn trigger(&self) -> &str {
        &self.trigger
    }

    #[must_use]
    pub fn expected_color(&self) -> Rgb {
        self.expected
    }

    #[must_use]
    pub fn options(&self) -> &[ChoiceOption] {
        &self.options
    }

    #[must_use]
    pub fn option(&self, id: &OptionId) -> Option<&ChoiceOption> {
        self.options.iter().find(|o| &o.id == id)
    }

    #[must_use]
    pub fn is_correct(&self, id: &OptionId) -> bool {
        self.options
            .get(self.correct_slot)
            .is_some_and(|option| &option.id == id)
    }

    #[must_use]
    pub fn quality(&self) -> ChoiceQuality {
        self.quality
    }

    #[must_use]
    pub fn trial_index(&self) -> usize {
        self.trial_index
    }

    #[must_use]
    pub fn total_trials(&self) -> usize {
        self.total_trials
    }

    #[must_use]
    pub fn revealed_at(&self) -> Option<Instant> {
        self.revealed_at
    }

    pub(crate) fn mark_revealed(&mut self, at: Instant) {
        self.revealed_at = Some(at);
    }
}
