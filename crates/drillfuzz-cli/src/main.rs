//! drillfuzz CLI - Coverage-guided API fuzzing against an OpenAPI target

mod storage;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use drillfuzz_core::{Config, CoverageReport, FuzzerTests};
use drillfuzz_runner::{ApiFuzzer, FuzzingResult, HttpInvoker, config_filter, load_catalog};

#[derive(Parser)]
#[command(name = "drillfuzz")]
#[command(about = "Coverage-guided API fuzzing against an OpenAPI target")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, global = true, default_value = "terminal")]
    output: OutputFormat,

    /// Log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run API fuzzing
    Fuzz {
        /// Fuzzing mode (default: guided if enabled in config)
        #[arg(short, long)]
        mode: Option<Mode>,

        /// Report directory
        #[arg(short, long, default_value = ".drillfuzz/reports")]
        output_dir: PathBuf,

        /// Config file (default: .drillfuzz.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Seed override
        #[arg(long)]
        seed: Option<u64>,

        /// Generate test suites without calling the target
        #[arg(long)]
        generate_only: bool,

        /// Evolve-loop iteration bound override
        #[arg(long)]
        max_iterations: Option<usize>,
    },

    /// Initialize config file
    Init,

    /// Check config and spec
    Doctor,

    /// Export JSON Schema for the result format
    Schema,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum Mode {
    /// One pass over every permutation
    Single,
    /// Enrichment, evolve loop and minimization
    Guided,
}

impl Mode {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Guided => "guided",
        }
    }
}

#[derive(Clone, Copy, ValueEnum, PartialEq, Eq)]
enum OutputFormat {
    Terminal,
    Json,
    Silent,
}

fn init_logging(verbosity: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbosity {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("drillfuzz=info,drillfuzz_runner=info,drillfuzz_core=info"),
            2 => EnvFilter::new("drillfuzz=debug,drillfuzz_runner=debug,drillfuzz_core=debug"),
            _ => EnvFilter::new("trace"),
        })
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(3)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    Ok(match path {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    })
}

/// 0 when every executed call answered, 1 when the target raised exceptions.
fn exit_code(config: &Config, tests: &FuzzerTests) -> i32 {
    if config.call_endpoints && tests.exception_count() > 0 {
        1
    } else {
        0
    }
}

fn print_terminal(tests: &FuzzerTests, report: &CoverageReport, result: Option<&FuzzingResult>) {
    let metrics = &report.fuzzing_metrics;
    println!(
        "\n{} suites, {} calls ({} exceptions), seed {}",
        tests.test_suites.len(),
        tests.total_calls(),
        tests.exception_count(),
        tests.seed
    );
    println!(
        "  Behaviors: {} unique, {}/{} operations reached",
        metrics.unique_behaviors, report.covered_methods, report.total_methods
    );
    if metrics.edge_cases_generated + metrics.combinations_generated > 0 {
        println!(
            "  Generated: {} edge cases, {} combinations",
            metrics.edge_cases_generated, metrics.combinations_generated
        );
    }
    if let Some(result) = result {
        println!(
            "  Evolve: {} iterations, {} mutations, {:.1}% coverage{}",
            result.total_iterations,
            result.mutations_applied,
            result.final_coverage,
            if result.success { " (target reached)" } else { "" }
        );
    }
    if metrics.inputs_before_minimization > 0 {
        println!(
            "  Minimized: {} -> {} calls ({}% reduction)",
            metrics.inputs_before_minimization,
            metrics.inputs_after_minimization,
            metrics.minimization_reduction_percent
        );
    }

    if !metrics.exception_histogram.is_empty() {
        println!("\nExceptions:");
        for (kind, count) in &metrics.exception_histogram {
            println!("  {kind}: {count}");
        }
    }
    if !report.uncovered_lines.is_empty() {
        println!("\nGaps ({}):", report.uncovered_lines.len());
        for gap in &report.uncovered_lines {
            println!("  {}: {}", gap.method_name, gap.reason);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Fuzz {
            mode,
            output_dir,
            config,
            seed,
            generate_only,
            max_iterations,
        } => {
            let mut cfg = load_config(config.as_deref())?;
            if let Some(seed) = seed {
                cfg.fuzzing.seed = seed;
            }
            if let Some(max_iterations) = max_iterations {
                cfg.fuzzing.max_iterations = max_iterations;
            }
            if generate_only {
                cfg.call_endpoints = false;
            }
            let mode = mode.unwrap_or(if cfg.fuzzing.enable_coverage_guidance {
                Mode::Guided
            } else {
                Mode::Single
            });

            if cli.output != OutputFormat::Silent {
                eprintln!("Config:");
                eprintln!("  spec:     {}", cfg.spec.display());
                eprintln!("  base_url: {}", cfg.base_url);
                if !cfg.headers.is_empty() {
                    eprintln!("  headers:  {} configured", cfg.headers.len());
                }
                if !cfg.pins.is_empty() {
                    eprintln!("  pins:     {}", cfg.pins.len());
                }
                eprintln!("  mode:     {}", mode.as_str());
                eprintln!("  seed:     {}", cfg.fuzzing.seed);
                eprintln!();
            }

            let catalog = load_catalog(&cfg.spec)?;
            let invoker = HttpInvoker::from_config(&cfg)?;
            let mut fuzzer = ApiFuzzer::new(catalog, invoker)
                .with_seed(cfg.fuzzing.seed)
                .with_call_endpoints(cfg.call_endpoints);

            let fuzz_start = Instant::now();
            info!(operations = fuzzer.catalog().len(), mode = mode.as_str(), "fuzzing");
            let tests = match mode {
                Mode::Single => fuzzer.test_whole_api(config_filter(&cfg))?,
                Mode::Guided => {
                    fuzzer.test_whole_api_with_coverage_guidance(&cfg.fuzzing, config_filter(&cfg))?
                }
            };
            let duration_secs = fuzz_start.elapsed().as_secs_f64();

            if tests.total_calls() == 0 {
                eprintln!("Error: No calls were generated. Check spec and include list.");
                return Ok(3);
            }

            let report = fuzzer.coverage_report();
            let result = fuzzer.fuzzing_result();
            let code = exit_code(&cfg, &tests);

            match cli.output {
                OutputFormat::Terminal => {
                    print_terminal(&tests, &report, result);
                    println!("\nExit code: {code}");
                }
                OutputFormat::Json => {
                    let json_output = serde_json::json!({
                        "exit_code": code,
                        "duration_secs": duration_secs,
                        "coverage": report.summary(),
                        "metrics": report.fuzzing_metrics,
                        "gaps": report.uncovered_lines,
                        "evolution": result,
                        "tests": tests,
                    });
                    println!("{}", serde_json::to_string_pretty(&json_output)?);
                }
                OutputFormat::Silent => {}
            }

            let data = storage::ReportData {
                config: &cfg,
                tests: &tests,
                coverage: &report,
                evolution: result,
                mode: mode.as_str(),
                exit_code: code,
                duration_secs,
            };
            match storage::save_report(&output_dir, &data) {
                Ok(path) => {
                    if cli.output != OutputFormat::Silent {
                        eprintln!("Report saved: {}", path.display());
                    }
                }
                Err(e) => eprintln!("Warning: failed to save report: {e}"),
            }

            Ok(code)
        }

        Commands::Init => {
            let config_path = ".drillfuzz.toml";
            if Path::new(config_path).exists() {
                eprintln!("{config_path} already exists");
                return Ok(1);
            }

            std::fs::write(config_path, Config::example())?;
            println!("Created {config_path}");
            println!("\nEdit the file to configure:");
            println!("  - spec: path to your OpenAPI spec");
            println!("  - base_url: server to test");
            println!("  - headers: auth tokens, API keys");
            println!("  - pins: fixed values for chosen parameters");
            Ok(0)
        }

        Commands::Doctor => {
            println!("drillfuzz doctor");
            println!("================\n");

            let config = Config::load_default();
            println!(
                "[{}] Config file (.drillfuzz.toml)",
                if config.is_ok() { "OK" } else { "NG" }
            );

            let mut ready = true;
            match &config {
                Ok(cfg) => match load_catalog(&cfg.spec) {
                    Ok(catalog) => println!(
                        "[OK] Spec file ({}, {} operations)",
                        cfg.spec.display(),
                        catalog.len()
                    ),
                    Err(e) => {
                        ready = false;
                        println!("[NG] Spec file ({}): {e}", cfg.spec.display());
                    }
                },
                Err(e) => {
                    ready = false;
                    println!("  {e}");
                    println!("\nCreate config file:");
                    println!("  drillfuzz init");
                }
            }

            if ready {
                println!("\nReady to fuzz!");
                Ok(0)
            } else {
                Ok(1)
            }
        }

        Commands::Schema => {
            println!("{}", drillfuzz_core::generate_schema());
            Ok(0)
        }
    }
}
