//! Project configuration for API fuzzing

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Project configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// OpenAPI spec path (local file)
    pub spec: PathBuf,

    /// Base URL of the server to test
    pub base_url: String,

    /// HTTP headers (Auth, API keys, etc.)
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Execute generated calls; `false` only generates
    #[serde(default = "default_true")]
    pub call_endpoints: bool,

    /// Operations to keep (by name); empty keeps all
    #[serde(default)]
    pub include: Vec<String>,

    /// Fixed payloads applied to matching calls before execution
    #[serde(default)]
    pub pins: Vec<Pin>,

    #[serde(default)]
    pub fuzzing: FuzzingOptions,
}

const fn default_true() -> bool {
    true
}

/// A pinned parameter value.
///
/// ```toml
/// [[pins]]
/// operation = "GetUser"
/// parameter = "id"
/// value = 7
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pin {
    /// Operation name, e.g. "GetUser"
    pub operation: String,

    /// Parameter to overwrite
    pub parameter: String,

    pub value: serde_json::Value,
}

/// Options for a coverage-guided session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzingOptions {
    pub enable_coverage_guidance: bool,
    pub enable_edge_case_generation: bool,
    pub enable_combinatorial_testing: bool,
    pub enable_mutation: bool,
    pub minimize_inputs: bool,
    pub max_iterations: usize,
    pub max_duration_seconds: u64,
    pub target_coverage_percent: f64,
    /// Random mutations applied per seed per iteration
    pub mutation_count: usize,
    /// Population cap for the evolve loop
    pub population_size: usize,
    /// Tuple size for combinatorial generation (2 = pairwise)
    pub combinatorial_strength: usize,
    pub seed: u64,
}

pub const DEFAULT_SEED: u64 = 1_234_567;

impl Default for FuzzingOptions {
    fn default() -> Self {
        Self {
            enable_coverage_guidance: true,
            enable_edge_case_generation: true,
            enable_combinatorial_testing: true,
            enable_mutation: true,
            minimize_inputs: true,
            max_iterations: 1000,
            max_duration_seconds: 300,
            target_coverage_percent: 100.0,
            mutation_count: 10,
            population_size: 100,
            combinatorial_strength: 2,
            seed: DEFAULT_SEED,
        }
    }
}

impl FuzzingOptions {
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    #[must_use]
    pub fn with_max_duration(mut self, seconds: u64) -> Self {
        self.max_duration_seconds = seconds;
        self
    }

    #[must_use]
    pub fn without_mutation(mut self) -> Self {
        self.enable_mutation = false;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            spec: PathBuf::from("openapi.yaml"),
            base_url: "http://localhost:8080".to_string(),
            headers: HashMap::new(),
            call_endpoints: true,
            include: Vec::new(),
            pins: Vec::new(),
            fuzzing: FuzzingOptions::default(),
        }
    }
}

impl Config {
    /// Load config from file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e.to_string()))?;

        if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
        }
    }

    /// Load from the first default location present, else defaults
    pub fn load_default() -> Result<Self, ConfigError> {
        Self::load_from_dir(Path::new("."))
    }

    /// Like [`Config::load_default`], relative to `dir`
    pub fn load_from_dir(dir: &Path) -> Result<Self, ConfigError> {
        for name in CONFIG_CANDIDATES {
            let path = dir.join(name);
            if path.exists() {
                return Self::load(&path);
            }
        }
        Ok(Self::default())
    }

    /// Pins that apply to `operation`
    pub fn pins_for<'a>(&'a self, operation: &'a str) -> impl Iterator<Item = &'a Pin> + 'a {
        self.pins.iter().filter(move |p| p.operation == operation)
    }

    #[must_use]
    pub fn includes(&self, operation: &str) -> bool {
        self.include.is_empty() || self.include.iter().any(|o| o == operation)
    }

    /// Create example config file
    pub fn example() -> &'static str {
        r#"# drillfuzz configuration

# OpenAPI spec (local file path)
spec = "openapi.yaml"

# Server to test
base_url = "http://localhost:8080"

# Execute calls (false = generate test suites only)
call_endpoints = true

# Restrict fuzzing to these operations (empty = all)
# include = ["GetUser", "ListUsers"]

# HTTP headers (auth, api keys)
[headers]
Authorization = "Bearer your-token-here"
# X-API-Key = "your-api-key"

# Pin fixed values into matching calls
# [[pins]]
# operation = "GetUser"
# parameter = "id"
# value = 7

# Coverage-guided session
[fuzzing]
seed = 1234567
enable_edge_case_generation = true
enable_combinatorial_testing = true
enable_mutation = true
minimize_inputs = true
max_iterations = 1000
max_duration_seconds = 300
target_coverage_percent = 100.0
mutation_count = 10
population_size = 100
combinatorial_strength = 2
"#
    }
}

pub const CONFIG_CANDIDATES: [&str; 3] = [".drillfuzz.toml", ".drillfuzz.json", "drillfuzz.toml"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read {0}: {1}")]
    Io(PathBuf, String),
    #[error("Parse error: {0}")]
    Parse(String),
}
