//! Greedy t-wise covering-array generation
//!
//! Samples one value per parameter at random and keeps the sample only if it
//! covers a value tuple not seen before. Stops once every tuple is covered or the
//! iteration budget runs out. Runtime is bounded; minimality is not.

use std::collections::{BTreeSet, HashSet};

use drillfuzz_core::{ApiCall, FuzzError, ParameterValue, PrimitiveKind, TypeDescriptor, Value};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

pub const DEFAULT_MAX_ITERATIONS: usize = 10_000;

/// Order-id offset for combination calls.
pub const COMBO_ORDER_OFFSET: u32 = 10_000;

/// One value per parameter, in parameter order.
pub type Combination = Vec<(String, Value)>;

/// Candidate values used for combinatorial sampling.
#[must_use]
pub fn sample_pool(ty: &TypeDescriptor) -> Vec<Value> {
    match ty.primitive_kind() {
        Some(PrimitiveKind::Int) => [0, 1, -1, 100].map(Value::Int).to_vec(),
        Some(PrimitiveKind::Long) => [0, 1, -1, 100].map(Value::Long).to_vec(),
        Some(PrimitiveKind::Double) => [0.0, 1.0, -1.0, 100.5].map(Value::Double).to_vec(),
        Some(PrimitiveKind::String | PrimitiveKind::Email) => ["", "test", "TEST123"]
            .map(|s| Value::String(s.to_string()))
            .to_vec(),
        Some(PrimitiveKind::Bool) => vec![Value::Bool(true), Value::Bool(false)],
        _ => vec![Value::Null],
    }
}

/// Every size-`t` subset of `0..k`, lexicographic.
fn index_subsets(k: usize, t: usize) -> Vec<Vec<usize>> {
    fn walk(start: usize, k: usize, t: usize, current: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        if current.len() == t {
            out.push(current.clone());
            return;
        }
        for i in start..k {
            current.push(i);
            walk(i + 1, k, t, current, out);
            current.pop();
        }
    }
    let mut out = Vec::new();
    walk(0, k, t, &mut Vec::with_capacity(t), &mut out);
    out
}

fn distinct_count(values: &[Value]) -> usize {
    values.iter().map(ToString::to_string).collect::<BTreeSet<_>>().len()
}

/// Number of distinct size-`t` value tuples across all parameter subsets.
#[must_use]
pub fn expected_tuple_count(pools: &[(String, Vec<Value>)], t: usize) -> usize {
    index_subsets(pools.len(), t)
        .iter()
        .map(|subset| {
            subset
                .iter()
                .map(|&i| distinct_count(&pools[i].1))
                .product::<usize>()
        })
        .sum()
}

fn tuple_key(combo: &Combination, subset: &[usize]) -> String {
    subset
        .iter()
        .map(|&i| format!("{}={}", combo[i].0, combo[i].1))
        .collect::<Vec<_>>()
        .join("|")
}

#[derive(Debug)]
pub struct CombinatorialGenerator {
    rng: SmallRng,
    max_iterations: usize,
}

impl CombinatorialGenerator {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Shorthand for strength 2.
    ///
    /// # Errors
    ///
    /// See [`CombinatorialGenerator::generate_twise`].
    pub fn generate_pairwise(
        &mut self,
        pools: &[(String, Vec<Value>)],
    ) -> Result<Vec<Combination>, FuzzError> {
        self.generate_twise(pools, 2)
    }

    /// Combinations covering every `strength`-sized value tuple, budget permitting.
    ///
    /// No parameters yields nothing; one parameter yields each of its values.
    /// `strength` is clamped to `1..=pools.len()`.
    ///
    /// # Errors
    ///
    /// Returns [`FuzzError::GenerationPhaseFailure`] if any pool is empty.
    pub fn generate_twise(
        &mut self,
        pools: &[(String, Vec<Value>)],
        strength: usize,
    ) -> Result<Vec<Combination>, FuzzError> {
        if let Some((name, _)) = pools.iter().find(|(_, values)| values.is_empty()) {
            return Err(FuzzError::phase(
                "combinatorial",
                format!("empty value pool for '{name}'"),
            ));
        }
        match pools {
            [] => return Ok(Vec::new()),
            [(name, values)] => {
                return Ok(values
                    .iter()
                    .map(|v| vec![(name.clone(), v.clone())])
                    .collect());
            }
            _ => {}
        }

        let t = strength.clamp(1, pools.len());
        let subsets = index_subsets(pools.len(), t);
        let total = expected_tuple_count(pools, t);
        let mut covered: HashSet<String> = HashSet::with_capacity(total);
        let mut combinations = Vec::new();

        let mut iterations = 0;
        while iterations < self.max_iterations && covered.len() < total {
            iterations += 1;
            let combo: Combination = pools
                .iter()
                .map(|(name, values)| {
                    let i = self.rng.gen_range(0..values.len());
                    (name.clone(), values[i].clone())
                })
                .collect();

            let mut is_new = false;
            for subset in &subsets {
                is_new |= covered.insert(tuple_key(&combo, subset));
            }
            if is_new {
                combinations.push(combo);
            }
        }

        debug!(
            strength = t,
            covered = covered.len(),
            total,
            iterations,
            combinations = combinations.len(),
            "t-wise generation finished"
        );
        Ok(combinations)
    }

    /// Derived calls, one per combination over the call's sample pools.
    ///
    /// # Errors
    ///
    /// See [`CombinatorialGenerator::generate_twise`].
    pub fn combination_calls(
        &mut self,
        call: &ApiCall,
        strength: usize,
    ) -> Result<Vec<ApiCall>, FuzzError> {
        let pools: Vec<(String, Vec<Value>)> = call
            .parameters
            .iter()
            .map(|p| (p.name.clone(), sample_pool(&p.ty)))
            .collect();
        let order_id = call.order_id.saturating_add(COMBO_ORDER_OFFSET);

        Ok(self
            .generate_twise(&pools, strength)?
            .into_iter()
            .map(|combo| {
                let parameters = call
                    .parameters
                    .iter()
                    .map(|p| {
                        let value = combo
                            .iter()
                            .find(|(name, _)| *name == p.name)
                            .map_or_else(|| p.value.clone(), |(_, v)| v.clone());
                        ParameterValue::new(p.name.clone(), p.ty.clone(), value)
                    })
                    .collect();
                call.derive(order_id, parameters)
            })
            .collect())
    }

    /// Each call followed by its combination calls.
    ///
    /// # Errors
    ///
    /// Fails as a whole if any call's pools cannot be sampled.
    pub fn enrich(
        &mut self,
        calls: Vec<ApiCall>,
        strength: usize,
    ) -> Result<Vec<ApiCall>, FuzzError> {
        let mut out = Vec::with_capacity(calls.len());
        for call in calls {
            let derived = self.combination_calls(&call, strength)?;
            out.push(call);
            out.extend(derived);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drillfuzz_core::HttpMethod;
    use std::collections::HashSet;

    fn bools(names: &[&str]) -> Vec<(String, Vec<Value>)> {
        names
            .iter()
            .map(|n| (n.to_string(), vec![Value::Bool(true), Value::Bool(false)]))
            .collect()
    }

    #[test]
    fn three_booleans_cover_all_twelve_pairs() {
        let pools = bools(&["a", "b", "c"]);
        assert_eq!(expected_tuple_count(&pools, 2), 12);

        let combos = CombinatorialGenerator::new(42)
            .generate_pairwise(&pools)
            .unwrap();
        let mut pairs = HashSet::new();
        for combo in &combos {
            for subset in index_subsets(3, 2) {
                pairs.insert(tuple_key(combo, &subset));
            }
        }
        assert_eq!(pairs.len(), 12);
        assert!(combos.len() <= 8, "no combination is kept without news");
    }

    #[test]
    fn pairwise_beats_exhaustive_for_wider_inputs() {
        let pools = bools(&["a", "b", "c", "d", "e", "f"]);
        let combos = CombinatorialGenerator::new(7).generate_pairwise(&pools).unwrap();
        let mut pairs = HashSet::new();
        for combo in &combos {
            for subset in index_subsets(6, 2) {
                pairs.insert(tuple_key(combo, &subset));
            }
        }
        assert_eq!(pairs.len(), expected_tuple_count(&pools, 2));
        assert!(combos.len() < 64);
    }

    #[test]
    fn single_parameter_yields_each_value() {
        let pools = vec![("id".to_string(), sample_pool(&TypeDescriptor::int()))];
        let combos = CombinatorialGenerator::new(1).generate_twise(&pools, 2).unwrap();
        assert_eq!(combos.len(), 4);
        assert_eq!(combos[3], vec![("id".to_string(), Value::Int(100))]);
    }

    #[test]
    fn no_parameters_yield_nothing() {
        let combos = CombinatorialGenerator::new(1).generate_twise(&[], 2).unwrap();
        assert!(combos.is_empty());
    }

    #[test]
    fn empty_pool_is_a_phase_failure() {
        let pools = vec![("a".to_string(), vec![]), ("b".to_string(), vec![Value::Null])];
        let err = CombinatorialGenerator::new(1).generate_twise(&pools, 2).unwrap_err();
        assert!(matches!(err, FuzzError::GenerationPhaseFailure { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn budget_bounds_runtime() {
        let pools = bools(&["a", "b", "c"]);
        let combos = CombinatorialGenerator::new(42)
            .with_max_iterations(1)
            .generate_pairwise(&pools)
            .unwrap();
        assert_eq!(combos.len(), 1);
    }

    #[test]
    fn strength_is_clamped() {
        let pools = bools(&["a", "b"]);
        assert_eq!(expected_tuple_count(&pools, 2), 4);
        let combos = CombinatorialGenerator::new(3).generate_twise(&pools, 5).unwrap();
        assert!(!combos.is_empty() && combos.len() <= 4);
    }

    #[test]
    fn combination_calls_keep_other_values_and_offset_order() {
        let call = ApiCall::new(
            3,
            "Create",
            HttpMethod::Post,
            vec![
                ParameterValue::new("n", TypeDescriptor::int(), Value::Int(9)),
                ParameterValue::new("flag", TypeDescriptor::bool(), Value::Bool(true)),
            ],
        );
        let derived = CombinatorialGenerator::new(42).combination_calls(&call, 2).unwrap();
        assert!(!derived.is_empty());
        assert!(derived.iter().all(|c| c.order_id == 10_003));
        assert!(derived.iter().all(|c| {
            matches!(c.param("n").unwrap().value, Value::Int(0 | 1 | -1 | 100))
        }));
    }
}
