//! Coverage-guided pass

use std::collections::BTreeSet;
use std::time::Instant;

use drillfuzz_core::{ApiCall, CorpusMinimizer, FuzzError, FuzzerTests, FuzzingOptions, TestSuite};
use tracing::{info, warn};

use super::ApiFuzzer;
use super::evolve::{Evolution, Member};
use crate::combinatorial::CombinatorialGenerator;
use crate::edge::enrich_with_edge_cases;
use crate::invoker::Invoker;

impl<I: Invoker> ApiFuzzer<I> {
    /// Permutations enriched with edge cases and t-wise combinations, executed,
    /// evolved by mutation, then minimized to one call per observed behavior.
    ///
    /// Enrichment failures are logged and skip that phase. Unexpected invocation
    /// failures are recorded as call results instead of aborting.
    ///
    /// # Errors
    ///
    /// [`FuzzError::UnsupportedType`] from generation, or
    /// [`FuzzError::UnknownOperation`] if the filter renames a call.
    pub fn test_whole_api_with_coverage_guidance(
        &mut self,
        options: &FuzzingOptions,
        mut filter: impl FnMut(&mut ApiCall) -> bool,
    ) -> Result<FuzzerTests, FuzzError> {
        let started = Instant::now();
        self.reset_coverage();
        for operation in self.catalog.operations() {
            self.tracker.declare_operation(&operation.name);
        }
        info!(seed = self.seed, "starting coverage-guided fuzzing");

        let mut combinations = CombinatorialGenerator::new(self.seed);
        let mut suites = self.filtered_suites(&mut filter)?;
        let mut base_inputs = 0;
        let mut edge_cases = 0;
        let mut combos = 0;
        let mut phase_failures = Vec::new();

        for suite in &mut suites {
            let mut calls = std::mem::take(&mut suite.api_calls);
            base_inputs += calls.len();

            if options.enable_edge_case_generation {
                let before = calls.len();
                calls = enrich_with_edge_cases(calls);
                edge_cases += calls.len() - before;
            }

            if options.enable_combinatorial_testing {
                let before = calls.len();
                match combinations.enrich(calls.clone(), options.combinatorial_strength) {
                    Ok(enriched) => {
                        combos += enriched.len() - before;
                        calls = enriched;
                    }
                    Err(e) => {
                        warn!(suite = suite.order_id, "{e}; combinatorial phase skipped");
                        phase_failures.push(e.to_string());
                    }
                }
            }
            suite.api_calls = calls;
        }

        let mut suite_keys = vec![BTreeSet::new(); suites.len()];
        let mut evolution = None;
        if self.call_endpoints {
            for (suite, keys) in suites.iter_mut().zip(&mut suite_keys) {
                for call in &mut suite.api_calls {
                    keys.insert(self.execute_guided(call)?);
                }
            }

            if options.enable_mutation {
                let population = suites
                    .iter()
                    .enumerate()
                    .flat_map(|(i, s)| s.api_calls.iter().map(move |c| Member::new(c, i)))
                    .collect();
                let mut run = Evolution::new(options, population);
                let result = run.run(self, &mut suites, &mut suite_keys);
                evolution = Some(result);
            }
        }

        let mut minimized = None;
        if options.minimize_inputs && self.call_endpoints {
            info!("minimizing corpus");
            minimized = Some(minimize_suites(&mut suites, &mut suite_keys));
        }

        self.assign_suite_coverage(&mut suites, &suite_keys);

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let (mutations, iterations) = evolution
            .as_ref()
            .map_or((0, 0), |r| (r.mutations_applied, r.total_iterations));
        self.tracker.update_metrics(|m| {
            m.unique_inputs_generated = base_inputs;
            m.edge_cases_generated = edge_cases;
            m.combinations_generated = combos;
            m.mutations_applied = mutations;
            m.iterations_completed = iterations;
            if let Some((before, after)) = minimized {
                m.record_minimization(before, after);
            }
            m.total_duration_ms = elapsed_ms;
        });

        let report = self.tracker.generate_report();
        let metrics = &report.fuzzing_metrics;
        info!(
            elapsed_ms,
            calls = metrics.total_api_calls,
            edge_cases,
            combinations = combos,
            exceptions = metrics.exceptions_encountered,
            behaviors = metrics.unique_behaviors,
            "coverage-guided fuzzing complete"
        );
        if minimized.is_some() {
            info!(
                before = metrics.inputs_before_minimization,
                after = metrics.inputs_after_minimization,
                reduction = metrics.minimization_reduction_percent,
                "minimization"
            );
        }

        if let Some(mut result) = evolution {
            result.discovered_exceptions.extend(phase_failures);
            self.last_result = Some(result);
        }
        self.last_report = Some(report);

        let mut tests = FuzzerTests::new(self.seed, suites);
        tests.sort();
        Ok(tests)
    }
}

/// Minimize across all suites, keeping each survivor in the suite it came from.
///
/// Suites left without calls are dropped. Returns `(before, after)`.
fn minimize_suites(
    suites: &mut Vec<TestSuite>,
    suite_keys: &mut Vec<BTreeSet<String>>,
) -> (usize, usize) {
    let mut origin = Vec::new();
    let mut all = Vec::new();
    for (i, suite) in suites.iter_mut().enumerate() {
        for call in suite.api_calls.drain(..) {
            origin.push(i);
            all.push(call);
        }
    }

    let outcome = CorpusMinimizer::new().minimize_indices(&all);
    let mut slots: Vec<Option<ApiCall>> = all.into_iter().map(Some).collect();
    for i in outcome.kept {
        if let Some(call) = slots[i].take() {
            suites[origin[i]].api_calls.push(call);
        }
    }

    let mut index = 0;
    suite_keys.retain(|_| {
        let keep = !suites[index].api_calls.is_empty();
        index += 1;
        keep
    });
    suites.retain(|s| !s.api_calls.is_empty());
    (outcome.before, outcome.after)
}

#[cfg(test)]
mod tests {
    use super::*;
    use drillfuzz_core::{CallResult, HttpMethod};
    use serde_json::json;

    fn executed(order: u32, name: &str, body: serde_json::Value) -> ApiCall {
        let mut call = ApiCall::new(order, name, HttpMethod::Get, vec![]);
        call.result = Some(CallResult::Response(body));
        call
    }

    #[test]
    fn minimized_calls_stay_in_their_suite() {
        let mut suites = vec![
            TestSuite::new(0, vec![executed(0, "A", json!(1)), executed(1, "B", json!(1))]),
            TestSuite::new(1, vec![executed(0, "B", json!(1)), executed(1, "A", json!(1))]),
            TestSuite::new(2, vec![executed(0, "C", json!([]))]),
        ];
        let mut keys = vec![BTreeSet::from(["a".to_string()]); 3];

        let (before, after) = minimize_suites(&mut suites, &mut keys);

        assert_eq!((before, after), (5, 3));
        assert_eq!(suites.len(), 2);
        assert_eq!(keys.len(), 2);
        let names: Vec<_> = suites[0].api_calls.iter().map(|c| c.method_name.as_str()).collect();
        assert_eq!(names, ["A", "B"]);
        assert_eq!(suites[1].order_id, 2);
        assert_eq!(suites[1].api_calls[0].method_name, "C");
    }
}
