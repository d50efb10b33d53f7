//! Persistent report storage
//!
//! Every `drillfuzz fuzz` run is saved regardless of `--output` mode.
//! Directory layout: `{report_dir}/{host_port}_{timestamp}_{mode}/`

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use drillfuzz_core::scrub::to_scrubbed_json;
use drillfuzz_core::{Config, CoverageReport, FuzzerTests};
use drillfuzz_runner::FuzzingResult;

/// Everything needed to persist a fuzz session.
pub struct ReportData<'a> {
    pub config: &'a Config,
    pub tests: &'a FuzzerTests,
    pub coverage: &'a CoverageReport,
    pub evolution: Option<&'a FuzzingResult>,
    pub mode: &'a str,
    pub exit_code: i32,
    pub duration_secs: f64,
}

/// Write a session under `base`. Returns the session directory.
///
/// Files: `config.toml`, `fuzzer-tests.json` (scrubbed), `coverage.json`,
/// `summary.json`, and `fuzzing-result.json` when the evolve loop ran.
pub fn save_report(base: &Path, data: &ReportData) -> Result<PathBuf, std::io::Error> {
    let now = Utc::now();
    let report_dir = base.join(build_dir_name(&data.config.base_url, data.mode, now));
    std::fs::create_dir_all(&report_dir)?;

    let config_toml =
        toml::to_string_pretty(data.config).map_err(|e| std::io::Error::other(e.to_string()))?;
    std::fs::write(report_dir.join("config.toml"), config_toml)?;

    let tests = to_scrubbed_json(data.tests).map_err(std::io::Error::other)?;
    std::fs::write(report_dir.join("fuzzer-tests.json"), tests)?;

    std::fs::write(
        report_dir.join("coverage.json"),
        serde_json::to_string_pretty(data.coverage).map_err(std::io::Error::other)?,
    )?;

    if let Some(result) = data.evolution {
        std::fs::write(
            report_dir.join("fuzzing-result.json"),
            serde_json::to_string_pretty(result).map_err(std::io::Error::other)?,
        )?;
    }

    let metrics = &data.coverage.fuzzing_metrics;
    let summary = serde_json::json!({
        "exit_code": data.exit_code,
        "stats": {
            "seed": data.tests.seed,
            "suites": data.tests.test_suites.len(),
            "calls": data.tests.total_calls(),
            "exceptions": data.tests.exception_count(),
            "unique_behaviors": metrics.unique_behaviors,
            "exception_types": metrics.exception_histogram,
            "status_codes": metrics.response_status_codes,
        },
        "coverage": data.coverage.summary(),
        "meta": {
            "timestamp": now.to_rfc3339(),
            "mode": data.mode,
            "duration_secs": data.duration_secs,
            "base_url": data.config.base_url,
            "spec": data.config.spec.display().to_string(),
        },
    });
    std::fs::write(
        report_dir.join("summary.json"),
        serde_json::to_string_pretty(&summary).map_err(std::io::Error::other)?,
    )?;

    Ok(report_dir)
}

/// `{host_port}_{timestamp}_{mode}` e.g. `localhost_8080_20260205T193000_guided`
fn build_dir_name(base_url: &str, mode: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}_{}_{mode}",
        host_port(base_url),
        at.format("%Y%m%dT%H%M%S")
    )
}

/// `"http://localhost:8080/path"` → `"localhost_8080"`
fn host_port(url: &str) -> String {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    match rest.split('/').next() {
        Some(authority) if !authority.is_empty() => authority.replace(':', "_"),
        _ => "unknown".to_string(),
    }
}
