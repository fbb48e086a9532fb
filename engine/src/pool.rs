//! Local trial source built from a finished consistency session.

use std::sync::{Mutex, PoisonError};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use syntest_types::{ConsistencySummary, Rgb};

use crate::forced_choice::{ForcedChoiceGenerator, NextTrial, TrialDescriptor};
use crate::runtime::{TrialFut, TrialSource};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Association {
    trigger: String,
    color: Rgb,
}

/// Established stimulus/color associations, served as forced-choice trials.
///
/// Only a passing summary yields targets; each item with a usable mean color
/// becomes one trial, in shuffled order. A failed summary produces an empty
/// pool that reports `Done` immediately.
#[derive(Debug)]
pub struct AssociationPool {
    targets: Vec<Association>,
    generator: ForcedChoiceGenerator,
    rng: Mutex<StdRng>,
}

impl AssociationPool {
    #[must_use]
    pub fn from_summary(
        summary: &ConsistencySummary,
        generator: ForcedChoiceGenerator,
        seed: Option<u64>,
    ) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let mut targets: Vec<Association> = if summary.pass {
            summary
                .per_item
                .iter()
                .filter(|item| !item.is_insufficient())
                .filter_map(|item| {
                    item.mean_color.map(|color| Association {
                        trigger: item.label.to_string(),
                        color,
                    })
                })
                .collect()
        } else {
            Vec::new()
        };
        targets.shuffle(&mut rng);
        tracing::info!(
            targets = targets.len(),
            pass = summary.pass,
            "Built association pool"
        );
        Self {
            targets,
            generator,
            rng: Mutex::new(rng),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    #[must_use]
    pub fn trial(&self, index: usize) -> NextTrial {
        let Some(target) = self.targets.get(index) else {
            return NextTrial::Done;
        };
        let set = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            self.generator.generate(target.color, &mut *rng)
        };
        NextTrial::Trial(TrialDescriptor {
            id: format!("trial-{index}"),
            target_trigger: target.trigger.clone(),
            options: set.into_options(),
            expected_color: target.color,
            trial_index: index,
            total_trials: self.targets.len(),
        })
    }
}

impl TrialSource for AssociationPool {
    fn next_trial(&self, index: usize) -> TrialFut<'_> {
        let next = self.trial(index);
        Box::pin(async move { Ok(next) })
    }
}
