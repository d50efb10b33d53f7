//! Evolve loop: mutate the population, execute unseen candidates, keep what grows coverage

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::time::{Duration, Instant};

use drillfuzz_core::coverage::percentage;
use drillfuzz_core::{
    ApiCall, CoverageGap, CoverageReport, FuzzingOptions, InputSeed, ParameterValue, TestSuite,
};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::ApiFuzzer;
use crate::invoker::Invoker;
use crate::mutation::MutationEngine;

/// Order-id offset for mutant calls.
pub const MUTANT_ORDER_OFFSET: u32 = 5000;

/// Directed mutation runs every this many iterations.
pub const DIRECTED_EVERY: usize = 5;

/// Gaps handed to each directed mutation.
pub const GAPS_PER_ITERATION: usize = 10;

pub const INTERESTING_FITNESS: i32 = 100;
pub const BASELINE_FITNESS: i32 = 1;

/// Outcome of an evolve loop
#[derive(Debug, Clone, Default, Serialize)]
pub struct FuzzingResult {
    /// Target coverage was reached
    pub success: bool,
    pub total_iterations: usize,
    pub unique_inputs_generated: usize,
    pub mutations_applied: usize,
    pub final_coverage: f64,
    pub total_duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_coverage_report: Option<CoverageReport>,
    /// Messages from failures isolated during the session
    pub discovered_exceptions: Vec<String>,
    pub uncovered_gaps: Vec<CoverageGap>,
    pub statistics: BTreeMap<String, serde_json::Value>,
}

/// Population entry: a seed plus the call it mutates and the suite it belongs to.
#[derive(Debug, Clone)]
pub(super) struct Member {
    seed: InputSeed,
    template: ApiCall,
    suite: usize,
}

impl Member {
    pub(super) fn new(call: &ApiCall, suite: usize) -> Self {
        let mut template = call.clone();
        template.result = None;
        Self {
            seed: InputSeed::from_call(call).with_fitness(BASELINE_FITNESS),
            template,
            suite,
        }
    }

    fn key(seed: &InputSeed) -> String {
        format!("{}#{}", seed.operation, seed.canonical_key())
    }

    /// Executable call carrying the mutant's values.
    fn to_call(&self, mutant: &InputSeed) -> ApiCall {
        let parameters = self
            .template
            .parameters
            .iter()
            .map(|p| {
                let value = mutant.values.get(&p.name).cloned().unwrap_or_else(|| p.value.clone());
                ParameterValue::new(p.name.clone(), p.ty.clone(), value)
            })
            .collect();
        self.template.derive(
            self.template.order_id.saturating_add(MUTANT_ORDER_OFFSET),
            parameters,
        )
    }
}

pub(super) struct Evolution {
    engine: MutationEngine,
    rng: SmallRng,
    population: Vec<Member>,
    seen: HashSet<String>,
    max_iterations: usize,
    max_duration: Duration,
    target_coverage: f64,
    mutation_count: usize,
    population_size: usize,
}

impl Evolution {
    pub(super) fn new(options: &FuzzingOptions, population: Vec<Member>) -> Self {
        let seen = population.iter().map(|m| Member::key(&m.seed)).collect();
        Self {
            engine: MutationEngine::new(options.seed),
            rng: SmallRng::seed_from_u64(options.seed),
            population,
            seen,
            max_iterations: options.max_iterations,
            max_duration: Duration::from_secs(options.max_duration_seconds),
            target_coverage: options.target_coverage_percent,
            mutation_count: options.mutation_count,
            population_size: options.population_size,
        }
    }

    /// Run until the iteration or duration bound, or the coverage target.
    ///
    /// Executed mutants are appended to their origin suite. A fatal failure
    /// ends the loop early; the result holds everything gathered until then.
    pub(super) fn run<I: Invoker>(
        &mut self,
        fuzzer: &ApiFuzzer<I>,
        suites: &mut [TestSuite],
        suite_keys: &mut [BTreeSet<String>],
    ) -> FuzzingResult {
        let started = Instant::now();
        let mut result = FuzzingResult::default();
        let mut reached = target_reached(&fuzzer.tracker.generate_report(), self.target_coverage);
        let mut gaps = Vec::new();
        info!(population = self.population.len(), "evolving");

        'evolve: while result.total_iterations < self.max_iterations
            && started.elapsed() < self.max_duration
            && !reached
        {
            result.total_iterations += 1;
            let iteration = result.total_iterations;
            gaps = fuzzer.tracker.generate_report().uncovered_lines;
            let directed_gaps = &gaps[..gaps.len().min(GAPS_PER_ITERATION)];

            let parents: Vec<Member> = self
                .population
                .iter()
                .take(self.population_size)
                .cloned()
                .collect();
            for parent in parents {
                let mut candidates = self.engine.mutate(&parent.seed, self.mutation_count);
                if iteration % DIRECTED_EVERY == 0 {
                    candidates.push(self.engine.smart_mutate(&parent.seed, directed_gaps));
                }

                for mut mutant in candidates {
                    if !self.seen.insert(Member::key(&mutant)) {
                        continue;
                    }
                    result.mutations_applied += 1;

                    let mut call = parent.to_call(&mutant);
                    let baseline = fuzzer.tracker.capture_coverage();
                    let key = match fuzzer.execute_guided(&mut call) {
                        Ok(key) => key,
                        Err(e) => {
                            warn!("{e}; evolve loop stopped");
                            result.discovered_exceptions.push(e.to_string());
                            break 'evolve;
                        }
                    };
                    let interesting = fuzzer.tracker.capture_coverage().grew_since(&baseline);
                    mutant.is_interesting = interesting;
                    mutant.fitness_score = if interesting {
                        INTERESTING_FITNESS
                    } else {
                        BASELINE_FITNESS
                    };
                    if interesting {
                        debug!(method = %call.method_name, behavior = %key, "new behavior");
                    }

                    suite_keys[parent.suite].insert(key);
                    suites[parent.suite].api_calls.push(call.clone());
                    self.population.push(Member {
                        seed: mutant,
                        template: parent.template.clone(),
                        suite: parent.suite,
                    });
                }
            }

            self.prune();
            let report = fuzzer.tracker.generate_report();
            reached = target_reached(&report, self.target_coverage);
            if iteration % 10 == 0 {
                info!(
                    iteration,
                    coverage = coverage_of(&report),
                    population = self.population.len(),
                    "evolve progress"
                );
            }
        }

        let report = fuzzer.tracker.generate_report();
        result.final_coverage = coverage_of(&report);
        result.success = result.final_coverage >= self.target_coverage;
        result.total_duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        result.unique_inputs_generated = self.seen.len();
        result.uncovered_gaps = gaps;
        result.discovered_exceptions.extend(
            report
                .fuzzing_metrics
                .discovered_exception_types
                .iter()
                .cloned(),
        );
        result.statistics = BTreeMap::from([
            ("population_size".to_string(), self.population.len().into()),
            ("unique_inputs".to_string(), self.seen.len().into()),
            ("mutations_performed".to_string(), result.mutations_applied.into()),
            ("coverage_per_iteration".to_string(), result.final_coverage.into()),
        ]);
        result.final_coverage_report = Some(report);
        info!(
            iterations = result.total_iterations,
            mutations = result.mutations_applied,
            coverage = result.final_coverage,
            "evolve loop finished"
        );
        result
    }

    /// Keep the fittest half plus a random sample of the rest, never more than the cap.
    fn prune(&mut self) {
        let max = self.population_size;
        if self.population.len() <= max {
            return;
        }
        self.population
            .sort_by(|a, b| b.seed.fitness_score.cmp(&a.seed.fitness_score));
        let keep = (max / 2).max(self.population.len() / 2).min(max);
        let mut rest = self.population.split_off(keep);
        rest.shuffle(&mut self.rng);
        rest.truncate(max - keep);
        self.population.extend(rest);
    }
}

/// The coverage target only ends the loop against declared line/branch totals.
/// Without them coverage is the operation share, which saturates after the
/// first pass, so the loop runs to its iteration or duration bound.
fn target_reached(report: &CoverageReport, target: f64) -> bool {
    report.total_lines + report.total_branches > 0 && report.total_coverage_percentage() >= target
}

/// Declared line/branch totals when present, else the share of declared
/// operations without a gap.
fn coverage_of(report: &CoverageReport) -> f64 {
    if report.total_lines + report.total_branches > 0 {
        report.total_coverage_percentage()
    } else {
        let open = report.uncovered_lines.len();
        percentage(report.total_methods.saturating_sub(open), report.total_methods)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drillfuzz_core::{HttpMethod, TypeDescriptor, Value};

    fn member(fitness: i32) -> Member {
        let call = ApiCall::new(
            3,
            "GetUser",
            HttpMethod::Get,
            vec![ParameterValue::new("id", TypeDescriptor::int(), Value::Int(fitness))],
        );
        let mut m = Member::new(&call, 0);
        m.seed.fitness_score = fitness;
        m
    }

    fn evolution(population_size: usize, population: Vec<Member>) -> Evolution {
        let options = FuzzingOptions {
            population_size,
            ..FuzzingOptions::default()
        };
        Evolution::new(&options, population)
    }

    #[test]
    fn pruning_respects_the_cap_and_keeps_the_fittest() {
        let population = (0..25).map(member).collect();
        let mut evo = evolution(10, population);
        evo.prune();
        assert_eq!(evo.population.len(), 10);
        // keep = max(5, 12).min(10) = 10 fittest
        assert_eq!(evo.population[0].seed.fitness_score, 24);
        assert!(evo.population.iter().all(|m| m.seed.fitness_score >= 15));
    }

    #[test]
    fn pruning_samples_the_remainder() {
        let population = (0..15).map(member).collect();
        let mut evo = evolution(10, population);
        evo.prune();
        assert_eq!(evo.population.len(), 10);
        // keep = max(5, 7) = 7 fittest, plus 3 sampled from the other 8
        let top: Vec<_> = evo.population[..7].iter().map(|m| m.seed.fitness_score).collect();
        assert_eq!(top, vec![14, 13, 12, 11, 10, 9, 8]);
        assert!(evo.population[7..].iter().all(|m| m.seed.fitness_score < 8));
    }

    #[test]
    fn small_populations_are_untouched() {
        let mut evo = evolution(10, vec![member(1), member(2)]);
        evo.prune();
        assert_eq!(evo.population.len(), 2);
    }

    #[test]
    fn mutant_calls_offset_order_and_keep_types() {
        let parent = member(1);
        let mut mutant = parent.seed.clone_fresh();
        mutant.values.insert("id".into(), Value::Null);
        let call = parent.to_call(&mutant);
        assert_eq!(call.order_id, 5003);
        assert_eq!(call.param("id").unwrap().value, Value::Null);
        assert_eq!(call.param("id").unwrap().ty, TypeDescriptor::int());
        assert!(call.result.is_none());
    }

    #[test]
    fn coverage_counts_operations_without_gaps() {
        let report = CoverageReport {
            total_methods: 4,
            uncovered_lines: vec![CoverageGap::default()],
            ..CoverageReport::default()
        };
        assert_eq!(coverage_of(&report), 75.0);

        let declared = CoverageReport {
            total_lines: 10,
            covered_lines: 5,
            ..report
        };
        assert_eq!(coverage_of(&declared), 50.0);
    }

    #[test]
    fn target_needs_declared_totals() {
        let saturated = CoverageReport {
            total_methods: 2,
            ..CoverageReport::default()
        };
        assert_eq!(coverage_of(&saturated), 100.0);
        assert!(!target_reached(&saturated, 100.0));

        let declared = CoverageReport {
            total_lines: 4,
            covered_lines: 4,
            ..saturated
        };
        assert!(target_reached(&declared, 100.0));
        assert!(!target_reached(&CoverageReport { covered_lines: 3, ..declared }, 100.0));
    }

    #[test]
    fn initial_population_is_marked_seen() {
        let evo = evolution(10, vec![member(4)]);
        assert!(evo.seen.contains("GetUser#id=4"));
    }
}
