//! Seeded mutation engine
//!
//! Random mutation draws a strategy per mutant. Directed ("smart") mutation
//! reads the reason text of a coverage gap to choose one.

pub mod strategy;

pub use strategy::MutationStrategy;

use drillfuzz_core::{CoverageGap, InputSeed};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

/// Gaps considered per directed mutation.
pub const MAX_DIRECTED_GAPS: usize = 5;

#[derive(Debug)]
pub struct MutationEngine {
    rng: SmallRng,
}

impl MutationEngine {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// `count` mutants of `seed`, each from a randomly drawn strategy.
    pub fn mutate(&mut self, seed: &InputSeed, count: usize) -> Vec<InputSeed> {
        (0..count)
            .map(|_| {
                let strategy = MutationStrategy::random(&mut self.rng);
                strategy.mutate(seed, &mut self.rng)
            })
            .collect()
    }

    /// Strategy hinted by the gap's reason.
    pub fn select_strategy(&mut self, gap: &CoverageGap) -> MutationStrategy {
        if gap.reason.contains("null") {
            MutationStrategy::Null
        } else if gap.reason.contains("boundary") || gap.reason.contains("range") {
            MutationStrategy::Boundary
        } else {
            MutationStrategy::random(&mut self.rng)
        }
    }

    /// Copy of `seed` with values rewritten toward the first few gaps.
    ///
    /// A gap targets the value named by its `method_name`; a gap naming the
    /// seed's own operation targets a random value instead.
    pub fn smart_mutate(&mut self, seed: &InputSeed, gaps: &[CoverageGap]) -> InputSeed {
        let mut mutated = seed.clone_fresh();
        for gap in gaps.iter().take(MAX_DIRECTED_GAPS) {
            let Some(key) = self.target_key(&mutated, gap) else {
                continue;
            };
            let strategy = self.select_strategy(gap);
            if let Some(value) = mutated.values.get_mut(&key) {
                *value = strategy.directed(value, &mut self.rng);
                mutated.is_interesting = true;
                debug!(operation = %mutated.operation, parameter = %key, %strategy, "directed mutation");
            }
        }
        mutated
    }

    fn target_key(&mut self, seed: &InputSeed, gap: &CoverageGap) -> Option<String> {
        if seed.values.contains_key(&gap.method_name) {
            return Some(gap.method_name.clone());
        }
        if gap.method_name != seed.operation || seed.values.is_empty() {
            return None;
        }
        let i = self.rng.gen_range(0..seed.values.len());
        seed.values.keys().nth(i).cloned()
    }
}
