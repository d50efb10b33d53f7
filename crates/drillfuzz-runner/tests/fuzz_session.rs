//! End-to-end fuzzing sessions against an in-memory target

use chrono::{TimeZone, Utc};
use drillfuzz_core::scrub::to_scrubbed_json;
use drillfuzz_core::{
    Catalog, Config, FuzzError, FuzzerTests, FuzzingOptions, HttpMethod, Operation, Parameter,
    ParameterValue, Pin, TypeDescriptor, Value,
};
use drillfuzz_runner::{ApiFuzzer, InvocationError, config_filter, keep_all};
use serde_json::json;

type Handler = fn(&Operation, &[ParameterValue]) -> Result<serde_json::Value, InvocationError>;

fn catalog() -> Catalog {
    Catalog::new(vec![
        Operation::new("ListUsers", HttpMethod::Get).with_path("/users"),
        Operation::new("GetUser", HttpMethod::Get)
            .with_path("/users/{id}")
            .with_parameter(Parameter::new("id", TypeDescriptor::int())),
    ])
}

/// Users 1..=9 exist; anything else is a 404 with a noisy message.
fn users(op: &Operation, args: &[ParameterValue]) -> Result<serde_json::Value, InvocationError> {
    match op.name.as_str() {
        "ListUsers" => Ok(json!([{"id": 1}, {"id": 2}])),
        _ => match args.first().map(|a| &a.value) {
            Some(Value::Int(id)) if (1..=9).contains(id) => Ok(json!({"id": id, "name": "u"})),
            _ => Err(InvocationError::api(
                404,
                "{\"title\":\"Not Found\",\"traceId\":\"00-abc-01\",\"at\":\"2024-05-01T10:00:00Z\"}",
            )),
        },
    }
}

fn fuzzer(handler: Handler) -> ApiFuzzer<Handler> {
    ApiFuzzer::new(catalog(), handler)
        .with_seed(42)
        .with_reference_time(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
}

fn listing(tests: &FuzzerTests) -> String {
    tests
        .test_suites
        .iter()
        .map(|suite| {
            let calls = suite
                .api_calls
                .iter()
                .map(|c| {
                    let args = c
                        .parameters
                        .iter()
                        .map(|p| format!("{}={}", p.name, p.value.to_json()))
                        .collect::<Vec<_>>()
                        .join(",");
                    format!("{}:{}({args})", c.order_id, c.method_name)
                })
                .collect::<Vec<_>>()
                .join(" ");
            format!("suite {}: {calls}", suite.order_id)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ── single pass ──

#[test]
fn single_pass_runs_every_permutation() {
    let tests = fuzzer(users).test_whole_api(keep_all).unwrap();

    assert_eq!(tests.seed, 42);
    insta::assert_snapshot!(listing(&tests), @r"
    suite 0: 0:GetUser(id=1) 1:ListUsers()
    suite 1: 0:ListUsers() 1:GetUser(id=1)
    ");
    assert_eq!(tests.exception_count(), 0);
    assert!(tests.calls().all(|c| c.response().is_some()));
}

#[test]
fn config_filter_restricts_and_pins() {
    let config = Config {
        include: vec!["GetUser".into()],
        pins: vec![Pin {
            operation: "GetUser".into(),
            parameter: "id".into(),
            value: json!(70),
        }],
        ..Config::default()
    };
    let tests = fuzzer(users).test_whole_api(config_filter(&config)).unwrap();

    assert_eq!(tests.total_calls(), 2);
    assert!(tests.calls().all(|c| c.method_name == "GetUser"));
    assert!(tests.calls().all(|c| c.param("id").unwrap().value == Value::Int(70)));
    assert_eq!(tests.exception_count(), 2);
}

#[test]
fn exception_messages_are_scrubbed() {
    let config = Config {
        pins: vec![Pin {
            operation: "GetUser".into(),
            parameter: "id".into(),
            value: json!(-5),
        }],
        ..Config::default()
    };
    let tests = fuzzer(users).test_whole_api(config_filter(&config)).unwrap();
    let exception = tests.calls().find_map(|c| c.exception()).unwrap();

    assert_eq!(exception.status_code, 404);
    assert_eq!(exception.type_name, "ApiException");
    assert!(!exception.message.contains("traceId"));
    assert!(!exception.message.contains("2024-05-01"));
    assert!(exception.message.contains("REMOVED_DATE"));
}

#[test]
fn unexpected_failure_aborts_with_the_call() {
    fn down(_: &Operation, _: &[ParameterValue]) -> Result<serde_json::Value, InvocationError> {
        Err(InvocationError::Unexpected("connection reset".into()))
    }
    let err = fuzzer(down).test_whole_api(keep_all).unwrap_err();

    assert!(err.is_fatal());
    match err {
        FuzzError::UnexpectedInvocationFailure { call, message } => {
            assert_eq!(call.method_name, "GetUser");
            assert_eq!(message, "connection reset");
        }
        other => panic!("unexpected error: {other}"),
    }
}

// ── coverage guidance ──

fn options() -> FuzzingOptions {
    FuzzingOptions::default().with_seed(42).without_mutation()
}

#[test]
fn guided_pass_enriches_and_reports() {
    let mut f = fuzzer(users);
    let tests = f
        .test_whole_api_with_coverage_guidance(&options(), keep_all)
        .unwrap();
    let report = f.coverage_report();
    let metrics = &report.fuzzing_metrics;

    assert_eq!(metrics.unique_inputs_generated, 4);
    assert!(metrics.edge_cases_generated > 0);
    assert!(metrics.combinations_generated > 0);
    assert!(metrics.inputs_before_minimization >= metrics.inputs_after_minimization);
    assert_eq!(metrics.inputs_after_minimization, tests.total_calls());
    assert!(tests.exception_count() > 0);
    assert!(report.covered_branches > 0);
    assert_eq!(report.total_methods, 2);
    assert_eq!(report.covered_methods, 2);
    assert!(f.fuzzing_result().is_none());
}

#[test]
fn guided_pass_is_reproducible_for_a_seed() {
    let run = || {
        let tests = fuzzer(users)
            .test_whole_api_with_coverage_guidance(&options(), keep_all)
            .unwrap();
        to_scrubbed_json(&tests).unwrap()
    };
    assert_eq!(run(), run());
}

#[test]
fn guided_pass_records_unexpected_failures() {
    fn flaky(op: &Operation, args: &[ParameterValue]) -> Result<serde_json::Value, InvocationError> {
        if op.name == "ListUsers" {
            return Err(InvocationError::Unexpected("socket closed".into()));
        }
        users(op, args)
    }
    let options = FuzzingOptions {
        minimize_inputs: false,
        ..options()
    };
    let tests = fuzzer(flaky)
        .test_whole_api_with_coverage_guidance(&options, keep_all)
        .unwrap();

    let failure = tests
        .calls()
        .find(|c| c.method_name == "ListUsers")
        .and_then(|c| c.exception())
        .unwrap();
    assert_eq!(failure.type_name, "UnexpectedInvocationFailure");
    assert_eq!(failure.status_code, 0);
}

fn evolving(max_iterations: usize) -> FuzzingOptions {
    FuzzingOptions {
        population_size: 8,
        mutation_count: 2,
        ..FuzzingOptions::default()
            .with_seed(7)
            .with_max_iterations(max_iterations)
    }
}

#[test]
fn evolve_loop_runs_to_the_iteration_bound() {
    let mut f = fuzzer(users);
    let tests = f
        .test_whole_api_with_coverage_guidance(&evolving(3), keep_all)
        .unwrap();
    let result = f.fuzzing_result().unwrap();

    assert_eq!(result.total_iterations, 3);
    assert!(result.mutations_applied > 0);
    assert!(result.final_coverage_report.is_some());
    assert!(result.statistics.contains_key("population_size"));
    assert!(tests.total_calls() > 0);
}

#[test]
fn zero_duration_stops_the_loop_before_mutating() {
    let options = FuzzingOptions {
        max_duration_seconds: 0,
        ..evolving(50)
    };
    let mut f = fuzzer(users);
    f.test_whole_api_with_coverage_guidance(&options, keep_all).unwrap();
    let result = f.fuzzing_result().unwrap();

    assert_eq!(result.total_iterations, 0);
    assert_eq!(result.mutations_applied, 0);
}

#[test]
fn mutants_join_the_suites_without_minimization() {
    let options = FuzzingOptions {
        minimize_inputs: false,
        ..evolving(2)
    };
    let baseline = FuzzingOptions {
        enable_mutation: false,
        ..options.clone()
    };
    let evolved = fuzzer(users)
        .test_whole_api_with_coverage_guidance(&options, keep_all)
        .unwrap();
    let plain = fuzzer(users)
        .test_whole_api_with_coverage_guidance(&baseline, keep_all)
        .unwrap();

    assert!(evolved.total_calls() > plain.total_calls());
    assert!(
        evolved
            .calls()
            .any(|c| (5000..10_000).contains(&c.order_id) && c.is_executed())
    );
    assert!(!plain.calls().any(|c| (5000..10_000).contains(&c.order_id)));
}
