//! Randomized deck construction.
//!
//! A deck is `repeats` blocks laid end to end. Every block is an independent
//! Fisher-Yates shuffle of the whole catalog, so each block contains every
//! item exactly once. The random source is injected; a seeded `StdRng` makes
//! decks reproducible.

use rand::Rng;
use rand::seq::SliceRandom;
use syntest_types::{StimulusCatalog, StimulusItem, TrialStep};

use crate::EngineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deck {
    steps: Vec<TrialStep>,
    items_per_block: usize,
    block_count: usize,
}

impl Deck {
    pub fn build<R: Rng + ?Sized>(
        catalog: &StimulusCatalog,
        repeats: usize,
        rng: &mut R,
    ) -> Result<Self, EngineError> {
        if repeats == 0 {
            return Err(EngineError::invalid("repeat count must be positive"));
        }
        let items_per_block = catalog.len();
        if items_per_block == 0 {
            return Err(EngineError::invalid("stimulus catalog must not be empty"));
        }

        let mut steps = Vec::with_capacity(items_per_block * repeats);
        for block_index in 0..repeats {
            let mut order: Vec<&StimulusItem> = catalog.items().iter().collect();
            order.shuffle(rng);
            steps.extend(
                order
                    .into_iter()
                    .enumerate()
                    .map(|(position_in_block, item)| TrialStep {
                        stimulus_id: item.id,
                        label: item.label.clone(),
                        domain: item.domain,
                        block_index,
                        position_in_block,
                    }),
            );
        }

        tracing::debug!(
            items = items_per_block,
            blocks = repeats,
            "Built trial deck"
        );
        Ok(Self {
            steps,
            items_per_block,
            block_count: repeats,
        })
    }

    /// Convenience: validate a label list into a catalog and build from it.
    pub fn from_labels<I, S, R>(labels: I, repeats: usize, rng: &mut R) -> Result<Self, EngineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        R: Rng + ?Sized,
    {
        let catalog = StimulusCatalog::from_labels(labels, None)?;
        Self::build(&catalog, repeats, rng)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    #[must_use]
    pub fn steps(&self) -> &[TrialStep] {
        &self.steps
    }

    #[must_use]
    pub fn step(&self, index: usize) -> Option<&TrialStep> {
        self.steps.get(index)
    }

    #[must_use]
    pub fn items_per_block(&self) -> usize {
        self.items_per_block
    }

    #[must_use]
    pub fn block_count(&self) -> usize {
        self.block_count
    }

    /// Deck index of the first step of `block`.
    #[must_use]
    pub fn block_start(&self, block: usize) -> Option<usize> {
        (block < self.block_count).then(|| block * self.items_per_block)
    }

    /// Deck index a step occupies.
    #[must_use]
    pub fn index_of(&self, step: &TrialStep) -> usize {
        step.block_index * self.items_per_block + step.position_in_block
    }

    pub fn blocks(&self) -> impl Iterator<Item = &[TrialStep]> + '_ {
        self.steps.chunks(self.items_per_block)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use syntest_types::StimulusCatalog;

    use super::Deck;
    use crate::EngineError;

    fn catalog(n: usize) -> StimulusCatalog {
        StimulusCatalog::from_labels((0..n).map(|i| format!("item-{i}")), None).unwrap()
    }

    #[test]
    fn every_block_is_a_permutation_of_the_catalog() {
        for seed in 0..25_u64 {
            for n in 1..7 {
                for repeats in 1..5 {
                    let mut rng = StdRng::seed_from_u64(seed);
                    let catalog = catalog(n);
                    let deck = Deck::build(&catalog, repeats, &mut rng).unwrap();
                    assert_eq!(deck.len(), n * repeats);
                    assert_eq!(deck.blocks().count(), repeats);

                    let expected: BTreeSet<u32> =
                        catalog.items().iter().map(|i| i.id.value()).collect();
                    for (block_index, block) in deck.blocks().enumerate() {
                        let ids: Vec<u32> = block.iter().map(|s| s.stimulus_id.value()).collect();
                        let unique: BTreeSet<u32> = ids.iter().copied().collect();
                        assert_eq!(ids.len(), unique.len(), "duplicate within block");
                        assert_eq!(unique, expected);
                        for (pos, step) in block.iter().enumerate() {
                            assert_eq!(step.block_index, block_index);
                            assert_eq!(step.position_in_block, pos);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn same_seed_same_deck() {
        let catalog = catalog(8);
        let a = Deck::build(&catalog, 3, &mut StdRng::seed_from_u64(7)).unwrap();
        let b = Deck::build(&catalog, 3, &mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn zero_repeats_is_rejected() {
        let err = Deck::build(&catalog(3), 0, &mut StdRng::seed_from_u64(1)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfiguration { .. }));
    }

    #[test]
    fn empty_label_list_is_rejected() {
        let empty: Vec<String> = Vec::new();
        let err = Deck::from_labels(empty, 2, &mut StdRng::seed_from_u64(1)).unwrap_err();
        assert!(matches!(err, EngineError::Catalog(_)));
    }

    #[test]
    fn block_boundaries() {
        let deck = Deck::build(&catalog(4), 3, &mut StdRng::seed_from_u64(3)).unwrap();
        assert_eq!(deck.block_start(0), Some(0));
        assert_eq!(deck.block_start(2), Some(8));
        assert_eq!(deck.block_start(3), None);
        let step = deck.step(9).unwrap();
        assert_eq!(deck.index_of(step), 9);
    }
}
