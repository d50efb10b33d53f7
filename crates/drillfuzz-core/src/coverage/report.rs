//! Coverage report model

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::metrics::FuzzingSessionMetrics;

/// Percentage rounded to two decimals; 0 when `total` is 0.
#[must_use]
pub fn percentage(covered: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(covered as f64 / total as f64 * 100.0)
}

pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Snapshot of everything the tracker has observed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageReport {
    pub timestamp: DateTime<Utc>,
    pub total_lines: usize,
    pub covered_lines: usize,
    pub total_branches: usize,
    pub covered_branches: usize,
    /// Declared operations
    pub total_methods: usize,
    /// Operations observed at least once
    pub covered_methods: usize,
    #[serde(default)]
    pub files: BTreeMap<String, FileCoverage>,
    /// `file:line` → hit count
    #[serde(default)]
    pub hit_counts: BTreeMap<String, u64>,
    #[serde(default)]
    pub uncovered_lines: Vec<CoverageGap>,
    #[serde(default)]
    pub branch_coverage: Vec<BranchCoverage>,
    #[serde(default)]
    pub fuzzing_metrics: FuzzingSessionMetrics,
}

impl Default for CoverageReport {
    fn default() -> Self {
        Self {
            timestamp: Utc::now(),
            total_lines: 0,
            covered_lines: 0,
            total_branches: 0,
            covered_branches: 0,
            total_methods: 0,
            covered_methods: 0,
            files: BTreeMap::new(),
            hit_counts: BTreeMap::new(),
            uncovered_lines: Vec::new(),
            branch_coverage: Vec::new(),
            fuzzing_metrics: FuzzingSessionMetrics::default(),
        }
    }
}

impl CoverageReport {
    #[must_use]
    pub fn line_coverage_percentage(&self) -> f64 {
        percentage(self.covered_lines, self.total_lines)
    }

    #[must_use]
    pub fn branch_coverage_percentage(&self) -> f64 {
        percentage(self.covered_branches, self.total_branches)
    }

    #[must_use]
    pub fn method_coverage_percentage(&self) -> f64 {
        percentage(self.covered_methods, self.total_methods)
    }

    /// Lines and branches combined.
    #[must_use]
    pub fn total_coverage_percentage(&self) -> f64 {
        percentage(
            self.covered_lines + self.covered_branches,
            self.total_lines + self.total_branches,
        )
    }

    #[must_use]
    pub fn unique_coverage_points(&self) -> usize {
        self.hit_counts.len()
    }

    #[must_use]
    pub fn summary(&self) -> CoverageSummary {
        CoverageSummary {
            line_coverage: self.line_coverage_percentage(),
            branch_coverage: self.branch_coverage_percentage(),
            method_coverage: self.method_coverage_percentage(),
            total_coverage: self.total_coverage_percentage(),
            total_lines: self.total_lines,
            covered_lines: self.covered_lines,
            total_branches: self.total_branches,
            covered_branches: self.covered_branches,
            unique_coverage_points: self.unique_coverage_points(),
            timestamp: self.timestamp,
        }
    }
}

/// Flat percentages for display and persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageSummary {
    pub line_coverage: f64,
    pub branch_coverage: f64,
    pub method_coverage: f64,
    pub total_coverage: f64,
    pub total_lines: usize,
    pub covered_lines: usize,
    pub total_branches: usize,
    pub covered_branches: usize,
    pub unique_coverage_points: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileCoverage {
    pub file_path: String,
    pub total_lines: usize,
    pub covered_lines: usize,
    pub line_hits: BTreeMap<u32, u64>,
    #[serde(default)]
    pub uncovered_line_numbers: Vec<u32>,
}

impl FileCoverage {
    #[must_use]
    pub fn percentage(&self) -> f64 {
        percentage(self.covered_lines, self.total_lines)
    }
}

/// A location or behavior not yet observed as exercised.
///
/// `reason` is a free-text hint consumed by directed mutation; it mentions
/// "null" or "boundary" when one of those strategies is likely to help.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageGap {
    pub file_path: String,
    pub line_number: u32,
    #[serde(default)]
    pub line_content: String,
    pub method_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchCoverage {
    pub file_path: String,
    pub line_number: u32,
    pub branch_type: String,
    pub is_covered: bool,
    pub hit_count: u64,
}
