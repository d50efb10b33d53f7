//! Thread-safe coverage tracker
//!
//! Two sources feed the same covered sets:
//! - instrumentation hooks calling [`CoverageTracker::mark_line_hit`] and
//!   [`CoverageTracker::mark_branch_hit`] from any thread;
//! - the behavior proxy: every completed call is recorded under
//!   `behavior/<operation>`, keyed by the structural hash of its response or
//!   by the status and type of its exception.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::hash::{Hash, Hasher};
use std::time::Instant;

use parking_lot::RwLock;
use tracing::debug;

use super::metrics::{ApiCallMetrics, FuzzingSessionMetrics};
use super::report::{BranchCoverage, CoverageGap, CoverageReport, FileCoverage};
use crate::model::{ApiCall, CallResult};

/// Location prefix for behavior-proxy hits.
pub const BEHAVIOR_PREFIX: &str = "behavior/";

/// Handle returned by [`CoverageTracker::start_tracking`].
#[derive(Debug, Clone)]
pub struct TrackedCall {
    pub method_name: String,
    started: Instant,
}

/// Covered-set sizes at one instant, cheap to take inside the mutation loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoverageSnapshot {
    pub covered_lines: usize,
    pub covered_branches: usize,
}

impl CoverageSnapshot {
    #[must_use]
    pub const fn grew_since(&self, baseline: &Self) -> bool {
        self.covered_lines > baseline.covered_lines
            || self.covered_branches > baseline.covered_branches
    }

    #[must_use]
    pub const fn total(&self) -> usize {
        self.covered_lines + self.covered_branches
    }
}

#[derive(Debug, Default)]
struct OperationBehavior {
    responses: u64,
    exceptions: u64,
}

#[derive(Debug, Default)]
struct TrackerState {
    line_hits: BTreeMap<String, BTreeMap<u32, u64>>,
    branch_hits: BTreeMap<String, BTreeMap<(u32, String), u64>>,
    covered_lines: HashSet<String>,
    covered_branches: HashSet<String>,
    declared_lines: Option<usize>,
    declared_branches: Option<usize>,
    declared_operations: BTreeSet<String>,
    operations: BTreeMap<String, OperationBehavior>,
    metrics: FuzzingSessionMetrics,
}

impl TrackerState {
    fn mark_line(&mut self, file: &str, line: u32) -> String {
        let key = format!("{file}:{line}");
        self.covered_lines.insert(key.clone());
        *self
            .line_hits
            .entry(file.to_string())
            .or_default()
            .entry(line)
            .or_insert(0) += 1;
        key
    }

    fn mark_branch(&mut self, file: &str, line: u32, kind: &str) -> String {
        let key = format!("{file}:{line}:{kind}");
        self.covered_branches.insert(key.clone());
        *self
            .branch_hits
            .entry(file.to_string())
            .or_default()
            .entry((line, kind.to_string()))
            .or_insert(0) += 1;
        key
    }

    fn gaps(&self) -> Vec<CoverageGap> {
        self.declared_operations
            .iter()
            .filter_map(|op| {
                let reason = match self.operations.get(op) {
                    None => "never reached; null or default inputs may unblock it",
                    Some(b) if b.responses == 0 && b.exceptions > 0 => {
                        "only exceptions observed; boundary values may pass validation"
                    }
                    Some(_) => return None,
                };
                Some(CoverageGap {
                    file_path: format!("{BEHAVIOR_PREFIX}{op}"),
                    line_number: 0,
                    line_content: String::new(),
                    method_name: op.clone(),
                    reason: reason.to_string(),
                })
            })
            .collect()
    }
}

/// Owned coverage state; share it behind `Arc` across threads.
#[derive(Debug, Default)]
pub struct CoverageTracker {
    state: RwLock<TrackerState>,
}

impl CoverageTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Totals reported by real instrumentation. Without them percentages are 0.
    pub fn declare_totals(&self, lines: usize, branches: usize) {
        let mut state = self.state.write();
        state.declared_lines = Some(lines);
        state.declared_branches = Some(branches);
    }

    /// Register an operation so it can be reported as a gap until observed.
    pub fn declare_operation(&self, name: &str) {
        self.state.write().declared_operations.insert(name.to_string());
    }

    pub fn mark_line_hit(&self, file_path: &str, line_number: u32) {
        self.state.write().mark_line(file_path, line_number);
    }

    pub fn mark_branch_hit(&self, file_path: &str, line_number: u32, branch_type: &str) {
        self.state
            .write()
            .mark_branch(file_path, line_number, branch_type);
    }

    #[must_use]
    pub fn start_tracking(&self, call: &ApiCall) -> TrackedCall {
        TrackedCall {
            method_name: call.method_name.clone(),
            started: Instant::now(),
        }
    }

    /// Record the outcome of a tracked call. Returns the behavior key it hit.
    pub fn complete_tracking(&self, tracked: TrackedCall, outcome: &CallResult) -> String {
        let elapsed_ms = tracked.started.elapsed().as_secs_f64() * 1000.0;
        let file = format!("{BEHAVIOR_PREFIX}{}", tracked.method_name);
        let mut state = self.state.write();

        let (key, metrics) = match outcome {
            CallResult::Response(body) => {
                state
                    .operations
                    .entry(tracked.method_name.clone())
                    .or_default()
                    .responses += 1;
                let key = state.mark_line(&file, structure_hash(body));
                let metrics = ApiCallMetrics {
                    method_name: tracked.method_name,
                    response_time_ms: elapsed_ms,
                    status_code: 200,
                    had_exception: false,
                    exception_type: None,
                };
                (key, metrics)
            }
            CallResult::Exception(e) => {
                state
                    .operations
                    .entry(tracked.method_name.clone())
                    .or_default()
                    .exceptions += 1;
                let key = state.mark_branch(&file, u32::from(e.status_code), &e.type_name);
                let metrics = ApiCallMetrics {
                    method_name: tracked.method_name,
                    response_time_ms: elapsed_ms,
                    status_code: e.status_code,
                    had_exception: true,
                    exception_type: Some(e.type_name.clone()),
                };
                (key, metrics)
            }
        };
        state.metrics.record_call(metrics);
        debug!(behavior = %key, elapsed_ms, "call tracked");
        key
    }

    #[must_use]
    pub fn capture_coverage(&self) -> CoverageSnapshot {
        let state = self.state.read();
        CoverageSnapshot {
            covered_lines: state.covered_lines.len(),
            covered_branches: state.covered_branches.len(),
        }
    }

    /// Whether `current` covers anything `baseline` did not.
    #[must_use]
    pub fn is_interesting(current: &CoverageReport, baseline: &CoverageReport) -> bool {
        current.covered_lines > baseline.covered_lines
            || current.covered_branches > baseline.covered_branches
    }

    /// Gaps present in `current` but not in `baseline`, matched by location.
    #[must_use]
    pub fn get_new_gaps(baseline: &CoverageReport, current: &CoverageReport) -> Vec<CoverageGap> {
        current
            .uncovered_lines
            .iter()
            .filter(|gap| {
                !baseline.uncovered_lines.iter().any(|g| {
                    g.file_path == gap.file_path && g.line_number == gap.line_number
                })
            })
            .cloned()
            .collect()
    }

    /// Apply session-level updates (iteration counts, generation tallies).
    pub fn update_metrics(&self, f: impl FnOnce(&mut FuzzingSessionMetrics)) {
        f(&mut self.state.write().metrics);
    }

    #[must_use]
    pub fn generate_report(&self) -> CoverageReport {
        let state = self.state.read();
        let covered_lines = state.covered_lines.len();
        let covered_branches = state.covered_branches.len();

        let mut hit_counts = BTreeMap::new();
        let mut files = BTreeMap::new();
        for (file, lines) in &state.line_hits {
            for (line, count) in lines {
                hit_counts.insert(format!("{file}:{line}"), *count);
            }
            files.insert(
                file.clone(),
                FileCoverage {
                    file_path: file.clone(),
                    total_lines: lines.len(),
                    covered_lines: lines.len(),
                    line_hits: lines.clone(),
                    uncovered_line_numbers: Vec::new(),
                },
            );
        }

        let mut branch_coverage = Vec::new();
        for (file, branches) in &state.branch_hits {
            for ((line, kind), count) in branches {
                hit_counts.insert(format!("{file}:{line}:{kind}"), *count);
                branch_coverage.push(BranchCoverage {
                    file_path: file.clone(),
                    line_number: *line,
                    branch_type: kind.clone(),
                    is_covered: true,
                    hit_count: *count,
                });
            }
        }

        let covered_methods = state
            .declared_operations
            .iter()
            .filter(|op| state.operations.contains_key(*op))
            .count();

        let mut metrics = state.metrics.clone();
        metrics.unique_behaviors = covered_lines + covered_branches;

        CoverageReport {
            timestamp: chrono::Utc::now(),
            total_lines: state.declared_lines.map_or(0, |t| t.max(covered_lines)),
            covered_lines,
            total_branches: state
                .declared_branches
                .map_or(0, |t| t.max(covered_branches)),
            covered_branches,
            total_methods: state.declared_operations.len(),
            covered_methods,
            files,
            hit_counts,
            uncovered_lines: state.gaps(),
            branch_coverage,
            fuzzing_metrics: metrics,
        }
    }

    /// Drop all hits, declarations and metrics.
    pub fn reset(&self) {
        *self.state.write() = TrackerState::default();
    }
}

/// 32-bit hash of a JSON value's shape (keys, kinds, array lengths), ignoring scalar values.
#[must_use]
pub fn structure_hash(value: &serde_json::Value) -> u32 {
    let mut hasher = DefaultHasher::new();
    hash_structure(value, &mut hasher);
    (hasher.finish() & u64::from(u32::MAX)) as u32
}

fn hash_structure(value: &serde_json::Value, hasher: &mut impl Hasher) {
    match value {
        serde_json::Value::Null => "null".hash(hasher),
        serde_json::Value::Bool(_) => "bool".hash(hasher),
        serde_json::Value::Number(_) => "number".hash(hasher),
        serde_json::Value::String(_) => "string".hash(hasher),
        serde_json::Value::Array(items) => {
            "array".hash(hasher);
            items.len().min(4).hash(hasher);
            for item in items.iter().take(3) {
                hash_structure(item, hasher);
            }
        }
        serde_json::Value::Object(map) => {
            "object".hash(hasher);
            for (k, v) in map {
                k.hash(hasher);
                hash_structure(v, hasher);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HttpMethod, SimplifiedException};
    use serde_json::json;
    use std::sync::Arc;

    fn call(name: &str) -> ApiCall {
        ApiCall::new(0, name, HttpMethod::Get, vec![])
    }

    fn respond(tracker: &CoverageTracker, name: &str, body: serde_json::Value) -> String {
        let tracked = tracker.start_tracking(&call(name));
        tracker.complete_tracking(tracked, &CallResult::Response(body))
    }

    fn fail(tracker: &CoverageTracker, name: &str, status: u16) -> String {
        let tracked = tracker.start_tracking(&call(name));
        tracker.complete_tracking(
            tracked,
            &CallResult::Exception(SimplifiedException::new(status, "bad", "ApiException")),
        )
    }

    // ── hits ──

    #[test]
    fn line_hits_count_and_cover_once() {
        let tracker = CoverageTracker::new();
        tracker.mark_line_hit("src/a.rs", 10);
        tracker.mark_line_hit("src/a.rs", 10);
        tracker.mark_line_hit("src/a.rs", 11);
        let report = tracker.generate_report();
        assert_eq!(report.covered_lines, 2);
        assert_eq!(report.hit_counts["src/a.rs:10"], 2);
        assert_eq!(report.files["src/a.rs"].line_hits.len(), 2);
    }

    #[test]
    fn branch_hits_are_keyed_by_kind() {
        let tracker = CoverageTracker::new();
        tracker.mark_branch_hit("src/a.rs", 3, "true");
        tracker.mark_branch_hit("src/a.rs", 3, "false");
        tracker.mark_branch_hit("src/a.rs", 3, "true");
        let report = tracker.generate_report();
        assert_eq!(report.covered_branches, 2);
        assert_eq!(report.branch_coverage.len(), 2);
        assert_eq!(report.hit_counts["src/a.rs:3:true"], 2);
    }

    #[test]
    fn declared_totals_drive_percentages() {
        let tracker = CoverageTracker::new();
        tracker.declare_totals(4, 0);
        tracker.mark_line_hit("f", 1);
        let report = tracker.generate_report();
        assert_eq!(report.line_coverage_percentage(), 25.0);
        assert_eq!(report.total_coverage_percentage(), 25.0);
    }

    // ── behavior proxy ──

    #[test]
    fn same_response_shape_is_one_behavior() {
        let tracker = CoverageTracker::new();
        let a = respond(&tracker, "GetUser", json!({"id": 1, "name": "a"}));
        let b = respond(&tracker, "GetUser", json!({"id": 2, "name": "b"}));
        assert_eq!(a, b);
        assert!(a.starts_with("behavior/GetUser:"));
        assert_eq!(tracker.capture_coverage().covered_lines, 1);
    }

    #[test]
    fn new_shape_or_exception_grows_coverage() {
        let tracker = CoverageTracker::new();
        respond(&tracker, "GetUser", json!({"id": 1}));
        let baseline = tracker.capture_coverage();

        respond(&tracker, "GetUser", json!({"id": 1}));
        assert!(!tracker.capture_coverage().grew_since(&baseline));

        let key = fail(&tracker, "GetUser", 404);
        assert_eq!(key, "behavior/GetUser:404:ApiException");
        assert!(tracker.capture_coverage().grew_since(&baseline));
    }

    #[test]
    fn metrics_follow_tracked_calls() {
        let tracker = CoverageTracker::new();
        respond(&tracker, "A", json!(null));
        fail(&tracker, "A", 500);
        let m = tracker.generate_report().fuzzing_metrics;
        assert_eq!(m.total_api_calls, 2);
        assert_eq!(m.exceptions_encountered, 1);
        assert_eq!(m.unique_behaviors, 2);
        assert_eq!(m.response_status_codes["500"], 1);
    }

    // ── gaps ──

    #[test]
    fn gaps_name_unreached_and_failing_operations() {
        let tracker = CoverageTracker::new();
        for op in ["Create", "Get", "List"] {
            tracker.declare_operation(op);
        }
        respond(&tracker, "List", json!([]));
        fail(&tracker, "Create", 400);

        let report = tracker.generate_report();
        assert_eq!(report.total_methods, 3);
        assert_eq!(report.covered_methods, 2);
        let gaps: Vec<_> = report
            .uncovered_lines
            .iter()
            .map(|g| (g.method_name.as_str(), g.reason.contains("boundary"), g.reason.contains("null")))
            .collect();
        assert_eq!(gaps, vec![("Create", true, false), ("Get", false, true)]);
    }

    #[test]
    fn new_gaps_exclude_known_locations() {
        let tracker = CoverageTracker::new();
        tracker.declare_operation("A");
        let baseline = tracker.generate_report();
        tracker.declare_operation("B");
        let current = tracker.generate_report();
        let fresh = CoverageTracker::get_new_gaps(&baseline, &current);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].method_name, "B");
    }

    // ── lifecycle ──

    #[test]
    fn reset_clears_everything() {
        let tracker = CoverageTracker::new();
        tracker.declare_operation("A");
        tracker.mark_line_hit("f", 1);
        respond(&tracker, "A", json!(1));
        tracker.reset();
        let report = tracker.generate_report();
        assert_eq!(report.covered_lines, 0);
        assert_eq!(report.total_methods, 0);
        assert_eq!(report.fuzzing_metrics.total_api_calls, 0);
        assert_eq!(tracker.capture_coverage(), CoverageSnapshot::default());
    }

    #[test]
    fn concurrent_hits_are_all_counted() {
        let tracker = Arc::new(CoverageTracker::new());
        std::thread::scope(|s| {
            for t in 0..4u32 {
                let tracker = Arc::clone(&tracker);
                s.spawn(move || {
                    for line in 0..100 {
                        tracker.mark_line_hit("shared", line);
                        tracker.mark_line_hit(&format!("t{t}"), line);
                    }
                });
            }
        });
        let report = tracker.generate_report();
        assert_eq!(report.hit_counts["shared:0"], 4);
        assert_eq!(report.covered_lines, 100 + 4 * 100);
    }

    #[test]
    fn structure_hash_ignores_scalar_values() {
        assert_eq!(
            structure_hash(&json!({"a": 1, "b": "x"})),
            structure_hash(&json!({"a": 99, "b": "y"}))
        );
        assert_ne!(
            structure_hash(&json!({"a": 1})),
            structure_hash(&json!({"a": "1"}))
        );
    }
}
