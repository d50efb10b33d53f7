//! drillfuzz-core: Data model, coverage tracking and corpus minimization for API fuzzing
//!
//! This crate holds everything that does not need randomness or I/O: the operation
//! and call model, the type descriptors values are generated from, the coverage
//! tracker that judges whether an input is interesting, and the minimizer that
//! reduces an executed corpus to one call per behavior.

pub mod config;
pub mod coverage;
pub mod error;
pub mod minimize;
pub mod model;
pub mod scrub;
pub mod types;
pub mod value;

pub use config::{Config, ConfigError, DEFAULT_SEED, FuzzingOptions, Pin};
pub use coverage::{
    CoverageGap, CoverageReport, CoverageSnapshot, CoverageSummary, CoverageTracker,
    FuzzingSessionMetrics,
};
pub use error::FuzzError;
pub use minimize::{CorpusMinimizer, Minimized};
pub use model::{
    ApiCall, CallResult, Catalog, FuzzerTests, HttpMethod, InputSeed, Operation, ParamLocation,
    Parameter, ParameterValue, SimplifiedException, TestSuite, generate_schema,
};
pub use types::{Field, PrimitiveKind, TypeDescriptor, TypeRegistry};
pub use value::Value;
