//! Coverage tracking, reports and session metrics

mod metrics;
mod report;
mod tracker;

pub use metrics::{ApiCallMetrics, FuzzingSessionMetrics, SLOWEST_CALLS_KEPT, reduction_percent};
pub use report::{
    BranchCoverage, CoverageGap, CoverageReport, CoverageSummary, FileCoverage, percentage,
};
pub use tracker::{
    BEHAVIOR_PREFIX, CoverageSnapshot, CoverageTracker, TrackedCall, structure_hash,
};
