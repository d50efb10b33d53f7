//! Fuzz orchestration over a catalog and an invoker
//!
//! [`ApiFuzzer::test_whole_api`] is the single pass: permutations, filter,
//! execution, sort. [`ApiFuzzer::test_whole_api_with_coverage_guidance`] adds
//! enrichment, the evolve loop and corpus minimization.

mod evolve;
mod guided;

pub use evolve::FuzzingResult;

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use drillfuzz_core::coverage::percentage;
use drillfuzz_core::{
    ApiCall, CallResult, Catalog, Config, CoverageReport, CoverageTracker, FuzzError, FuzzerTests,
    SimplifiedException, TestSuite,
};
use tracing::{debug, info};

use crate::invoker::Invoker;
use crate::permutation::build_test_suites;
use crate::valuegen::ValueGenerator;

/// Type name recorded when a guided run captures an unexpected failure as data.
pub const UNEXPECTED_FAILURE: &str = "UnexpectedInvocationFailure";

/// Filter that keeps every call unchanged.
pub fn keep_all(_: &mut ApiCall) -> bool {
    true
}

/// Filter built from a project config: `include` allow-list, then `pins`.
///
/// Pins overwrite matching parameters in place; a pin naming a parameter the
/// call does not have is ignored.
pub fn config_filter(config: &Config) -> impl FnMut(&mut ApiCall) -> bool + '_ {
    move |call: &mut ApiCall| {
        if !config.includes(&call.method_name) {
            return false;
        }
        let name = call.method_name.clone();
        for pin in config.pins_for(&name) {
            call.set_param_json(&pin.parameter, &pin.value);
        }
        true
    }
}

/// Drives generation and execution against one target.
pub struct ApiFuzzer<I> {
    catalog: Catalog,
    invoker: I,
    seed: u64,
    call_endpoints: bool,
    reference_time: Option<DateTime<Utc>>,
    tracker: Arc<CoverageTracker>,
    last_report: Option<CoverageReport>,
    last_result: Option<FuzzingResult>,
}

impl<I: Invoker> ApiFuzzer<I> {
    #[must_use]
    pub fn new(catalog: Catalog, invoker: I) -> Self {
        Self {
            catalog,
            invoker,
            seed: drillfuzz_core::DEFAULT_SEED,
            call_endpoints: true,
            reference_time: None,
            tracker: Arc::new(CoverageTracker::new()),
            last_report: None,
            last_result: None,
        }
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// `false` generates suites without executing them.
    #[must_use]
    pub fn with_call_endpoints(mut self, call_endpoints: bool) -> Self {
        self.call_endpoints = call_endpoints;
        self
    }

    /// Fixed anchor for generated timestamps.
    #[must_use]
    pub fn with_reference_time(mut self, reference_time: DateTime<Utc>) -> Self {
        self.reference_time = Some(reference_time);
        self
    }

    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Shared tracker; instrumentation hooks may record against it from any thread.
    #[must_use]
    pub fn tracker(&self) -> Arc<CoverageTracker> {
        Arc::clone(&self.tracker)
    }

    /// Report of the last run, generated on first request.
    pub fn coverage_report(&mut self) -> CoverageReport {
        self.last_report
            .get_or_insert_with(|| self.tracker.generate_report())
            .clone()
    }

    /// Evolve-loop outcome of the last guided run, if mutation ran.
    #[must_use]
    pub fn fuzzing_result(&self) -> Option<&FuzzingResult> {
        self.last_result.as_ref()
    }

    pub fn reset_coverage(&mut self) {
        self.tracker.reset();
        self.last_report = None;
        self.last_result = None;
    }

    fn value_generator(&self) -> ValueGenerator {
        let generator = ValueGenerator::new(self.seed);
        match self.reference_time {
            Some(at) => generator.with_reference_time(at),
            None => generator,
        }
    }

    /// Permutation suites with `filter` applied to every call.
    fn filtered_suites(
        &self,
        filter: &mut impl FnMut(&mut ApiCall) -> bool,
    ) -> Result<Vec<TestSuite>, FuzzError> {
        let mut generator = self.value_generator();
        let mut suites = build_test_suites(&self.catalog, &mut generator)?;
        for suite in &mut suites {
            suite.api_calls.retain_mut(|call| filter(call));
        }
        Ok(suites)
    }

    /// Single pass over every permutation.
    ///
    /// `filter` runs after generation and before execution; it may overwrite
    /// parameters on calls it keeps.
    ///
    /// # Errors
    ///
    /// [`FuzzError::UnsupportedType`] from generation, and
    /// [`FuzzError::UnexpectedInvocationFailure`] carrying the offending call.
    pub fn test_whole_api(
        &mut self,
        mut filter: impl FnMut(&mut ApiCall) -> bool,
    ) -> Result<FuzzerTests, FuzzError> {
        self.last_report = None;
        let mut suites = self.filtered_suites(&mut filter)?;
        info!(
            operations = self.catalog.len(),
            suites = suites.len(),
            seed = self.seed,
            "single pass"
        );

        if self.call_endpoints {
            let mut suite_keys = Vec::with_capacity(suites.len());
            for suite in &mut suites {
                let mut keys = BTreeSet::new();
                for call in &mut suite.api_calls {
                    keys.insert(self.execute(call)?);
                }
                suite_keys.push(keys);
            }
            self.assign_suite_coverage(&mut suites, &suite_keys);
        }

        let mut tests = FuzzerTests::new(self.seed, suites);
        tests.sort();
        Ok(tests)
    }

    /// Execute one call, storing its result. Returns the behavior key it hit.
    ///
    /// Exceptions in the target's standard shape become the call's result.
    fn execute(&self, call: &mut ApiCall) -> Result<String, FuzzError> {
        let Some(operation) = self.catalog.operation(&call.method_name) else {
            return Err(FuzzError::UnknownOperation(call.method_name.clone()));
        };
        let tracked = self.tracker.start_tracking(call);
        let outcome = match self.invoker.invoke(operation, &call.parameters) {
            Ok(body) => CallResult::Response(body),
            Err(e) => {
                let err = e.into_fuzz_error(call);
                match err.recorded_exception() {
                    Some(exception) => CallResult::Exception(exception),
                    None => return Err(err),
                }
            }
        };
        let key = self.tracker.complete_tracking(tracked, &outcome);
        debug!(order = call.order_id, method = %call.method_name, behavior = %key, "executed");
        call.result = Some(outcome);
        Ok(key)
    }

    /// Like [`ApiFuzzer::execute`], but unexpected failures are recorded as data.
    fn execute_guided(&self, call: &mut ApiCall) -> Result<String, FuzzError> {
        match self.execute(call) {
            Err(FuzzError::UnexpectedInvocationFailure { message, .. }) => {
                let outcome = CallResult::Exception(SimplifiedException::new(
                    0,
                    &message,
                    UNEXPECTED_FAILURE,
                ));
                let tracked = self.tracker.start_tracking(call);
                let key = self.tracker.complete_tracking(tracked, &outcome);
                call.result = Some(outcome);
                Ok(key)
            }
            other => other,
        }
    }

    /// Suite coverage = distinct behaviors the suite hit / all behaviors covered.
    fn assign_suite_coverage(&self, suites: &mut [TestSuite], suite_keys: &[BTreeSet<String>]) {
        let total = self.tracker.capture_coverage().total();
        for (suite, keys) in suites.iter_mut().zip(suite_keys) {
            suite.coverage_percentage = percentage(keys.len(), total);
        }
    }
}
