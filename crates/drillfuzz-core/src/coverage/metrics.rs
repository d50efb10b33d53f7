//! Per-session fuzzing metrics, independent of location coverage

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::report::round2;

/// Number of slowest calls retained.
pub const SLOWEST_CALLS_KEPT: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FuzzingSessionMetrics {
    pub total_api_calls: usize,
    pub unique_inputs_generated: usize,
    pub edge_cases_generated: usize,
    pub combinations_generated: usize,
    pub mutations_applied: usize,
    pub iterations_completed: usize,
    pub exceptions_encountered: usize,
    pub unique_exceptions: usize,
    pub inputs_before_minimization: usize,
    pub inputs_after_minimization: usize,
    pub minimization_reduction_percent: f64,
    pub unique_behaviors: usize,
    pub total_duration_ms: u64,
    pub average_response_time_ms: f64,
    #[serde(default)]
    pub discovered_exception_types: Vec<String>,
    /// Status code → count; responses count as 200
    #[serde(default)]
    pub response_status_codes: BTreeMap<String, usize>,
    /// Exception type → count
    #[serde(default)]
    pub exception_histogram: BTreeMap<String, usize>,
    #[serde(default)]
    pub slowest_api_calls: Vec<ApiCallMetrics>,
    #[serde(skip)]
    total_response_time_ms: f64,
}

/// Timing and outcome of one executed call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiCallMetrics {
    pub method_name: String,
    pub response_time_ms: f64,
    pub status_code: u16,
    pub had_exception: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_type: Option<String>,
}

impl FuzzingSessionMetrics {
    pub fn record_call(&mut self, call: ApiCallMetrics) {
        self.total_api_calls += 1;
        self.total_response_time_ms += call.response_time_ms;
        self.average_response_time_ms =
            round2(self.total_response_time_ms / self.total_api_calls as f64);

        *self
            .response_status_codes
            .entry(call.status_code.to_string())
            .or_insert(0) += 1;

        if let Some(ty) = &call.exception_type {
            self.exceptions_encountered += 1;
            let count = self.exception_histogram.entry(ty.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                self.discovered_exception_types.push(ty.clone());
            }
            self.unique_exceptions = self.exception_histogram.len();
        }

        let pos = self
            .slowest_api_calls
            .iter()
            .position(|c| c.response_time_ms < call.response_time_ms)
            .unwrap_or(self.slowest_api_calls.len());
        if pos < SLOWEST_CALLS_KEPT {
            self.slowest_api_calls.insert(pos, call);
            self.slowest_api_calls.truncate(SLOWEST_CALLS_KEPT);
        }
    }

    pub fn record_minimization(&mut self, before: usize, after: usize) {
        self.inputs_before_minimization = before;
        self.inputs_after_minimization = after;
        self.minimization_reduction_percent = reduction_percent(before, after);
    }
}

/// Share of inputs removed, one decimal; 0 for an empty input.
#[must_use]
pub fn reduction_percent(before: usize, after: usize) -> f64 {
    if before == 0 {
        return 0.0;
    }
    let removed = before.saturating_sub(after) as f64;
    (removed / before as f64 * 1000.0).round() / 10.0
}
