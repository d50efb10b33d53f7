//! Operation permutations → test suites
//!
//! The enumeration strategy is picked by operation count to bound blow-up:
//! full permutations up to 5 operations, ordered pairs up to 50, singletons beyond.

use drillfuzz_core::{ApiCall, Catalog, FuzzError, TestSuite};
use tracing::debug;

use crate::valuegen::ValueGenerator;

/// Largest catalog enumerated with full permutations.
pub const FULL_PERMUTATION_LIMIT: usize = 5;
/// Largest catalog enumerated with ordered pairs.
pub const PAIR_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermutationStrategy {
    /// Every ordering of every operation (N!)
    Full,
    /// Every ordered pair of distinct operations (N×(N-1))
    Pairs,
    /// Each operation alone (N)
    Singletons,
}

impl PermutationStrategy {
    #[must_use]
    pub const fn for_count(n: usize) -> Self {
        if n <= FULL_PERMUTATION_LIMIT {
            Self::Full
        } else if n <= PAIR_LIMIT {
            Self::Pairs
        } else {
            Self::Singletons
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Pairs => "pairs",
            Self::Singletons => "singletons",
        }
    }

    /// Index sequences over `0..n`, in lexicographic order.
    #[must_use]
    pub fn sequences(self, n: usize) -> Vec<Vec<usize>> {
        if n == 0 {
            return Vec::new();
        }
        match self {
            Self::Full => full_permutations(n),
            Self::Pairs => (0..n)
                .flat_map(|i| (0..n).filter(move |&j| j != i).map(move |j| vec![i, j]))
                .collect(),
            Self::Singletons => (0..n).map(|i| vec![i]).collect(),
        }
    }
}

impl std::fmt::Display for PermutationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn full_permutations(n: usize) -> Vec<Vec<usize>> {
    let mut current: Vec<usize> = (0..n).collect();
    let mut out = vec![current.clone()];
    while next_permutation(&mut current) {
        out.push(current.clone());
    }
    out
}

/// Advance to the next lexicographic permutation; `false` once exhausted.
fn next_permutation(items: &mut [usize]) -> bool {
    let Some(pivot) = (1..items.len()).rev().find(|&i| items[i - 1] < items[i]) else {
        return false;
    };
    let pivot = pivot - 1;
    let Some(successor) = (pivot + 1..items.len()).rev().find(|&j| items[j] > items[pivot]) else {
        return false;
    };
    items.swap(pivot, successor);
    items[pivot + 1..].reverse();
    true
}

/// One suite per permutation, every call populated by `generator`.
///
/// Suite order id = permutation index; call order id = position in the suite.
///
/// # Errors
///
/// Propagates [`FuzzError::UnsupportedType`] from value generation.
pub fn build_test_suites(
    catalog: &Catalog,
    generator: &mut ValueGenerator,
) -> Result<Vec<TestSuite>, FuzzError> {
    let operations = catalog.operations();
    let n = operations.len();
    let strategy = PermutationStrategy::for_count(n);
    let sequences = strategy.sequences(n);
    debug!(operations = n, %strategy, suites = sequences.len(), "building test suites");

    let mut suites = Vec::with_capacity(sequences.len());
    for (suite_order, sequence) in sequences.into_iter().enumerate() {
        let mut calls = Vec::with_capacity(sequence.len());
        for (position, index) in sequence.into_iter().enumerate() {
            let op = &operations[index];
            let params = generator.create_parameters(op, catalog.registry(), n)?;
            calls.push(ApiCall::new(
                order_id(position),
                op.name.clone(),
                op.http_method,
                params,
            ));
        }
        suites.push(TestSuite::new(order_id(suite_order), calls));
    }
    Ok(suites)
}

fn order_id(i: usize) -> u32 {
    u32::try_from(i).unwrap_or(u32::MAX)
}
