//! drillfuzz-runner: Input generation and coverage-guided execution for API fuzzing
//!
//! Values come from type descriptors, suites from operation permutations, and
//! extra inputs from edge cases, t-wise combinations and mutation. The
//! orchestrator drives them against an [`Invoker`].

pub mod combinatorial;
pub mod edge;
pub mod http;
pub mod invoker;
pub mod mutation;
pub mod orchestrator;
pub mod permutation;
pub mod valuegen;

pub use combinatorial::CombinatorialGenerator;
pub use http::{CatalogError, HttpInvoker, load_catalog};
pub use invoker::{InvocationError, Invoker};
pub use mutation::{MutationEngine, MutationStrategy};
pub use orchestrator::{ApiFuzzer, FuzzingResult, config_filter, keep_all};
pub use permutation::{PermutationStrategy, build_test_suites};
pub use valuegen::ValueGenerator;
