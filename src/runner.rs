//! The main runner: child-mode vs parent-mode dispatch and the sequential
//! orchestration loop.
//!
//! A user test binary hands its [`Registry`] to [`run`] from `main`. When
//! the first argument is the child-mode marker the process runs exactly one
//! test and serializes its result; otherwise it becomes the parent that
//! spawns one child per registered test, feeds the reporter, and exits 0
//! only when every test passed.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use tracing::{Level, warn};
use tracing_subscriber::FmtSubscriber;

use crate::codec;
use crate::config;
use crate::heap;
use crate::platform::{self, EXIT_CHILD_USAGE};
use crate::record;
use crate::registry::Registry;
use crate::report::{ConsoleReporter, MultiReporter, Reporter};
use crate::result::{RunResult, SuiteResult, TestStatus};
use crate::supervisor::Supervisor;

/// First argument of a child-mode invocation.
pub const CHILD_FLAG: &str = "--run_test";

#[derive(Parser, Debug)]
#[command(name = "cordon")]
#[command(about = "Process-isolating unit test harness", long_about = None)]
struct Cli {
    /// Run only the tests of this suite
    #[arg(long, value_name = "NAME")]
    suite: Option<String>,

    /// Default per-test timeout in milliseconds
    #[arg(long = "default_timeout_ms", value_name = "MS")]
    default_timeout_ms: Option<u64>,

    /// Configuration file path (default: cordon.toml when present)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// List registered tests instead of running them (text or json)
    #[arg(
        long = "list_tests",
        value_name = "FORMAT",
        num_args = 0..=1,
        default_missing_value = "text"
    )]
    list_tests: Option<String>,

    /// Verbose diagnostics on stderr
    #[arg(short, long)]
    verbose: bool,
}

/// Library entry point: dispatches to child or parent mode and returns the
/// process exit code for `main`.
pub fn run(registry: Registry) -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    run_with_args(registry, args)
}

/// [`run`] with an explicit argument vector.
pub fn run_with_args(registry: Registry, args: Vec<String>) -> ExitCode {
    ExitCode::from(run_with_args_code(registry, args))
}

fn run_with_args_code(registry: Registry, args: Vec<String>) -> u8 {
    if args.len() >= 2 && args[1] == CHILD_FLAG {
        if args.len() != 4 {
            eprintln!("Usage: {} {CHILD_FLAG} <suite> <test>", args[0]);
            return EXIT_CHILD_USAGE as u8;
        }
        return child_mode(&registry, &args[2], &args[3]);
    }

    let cli = Cli::parse_from(&args);
    match parent_mode(registry, cli) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("Error: {error:#}");
            1
        }
    }
}

/// Child mode: run one test to completion and serialize its result.
///
/// The child always exits 0 when the harness itself survives; the verdict
/// travels in the frame. Abnormal exits (aborts, fatal heap misuse, kills)
/// are diagnosed by the parent.
fn child_mode(registry: &Registry, suite: &str, name: &str) -> u8 {
    let Some(case) = registry.find(suite, name) else {
        eprintln!("Error: test '{suite}.{name}' not found in registry.");
        return 1;
    };

    record::begin(suite, name);
    heap::init_for_test(case.leak_check);

    (case.func)();

    if let Some(leak) = heap::leak_report() {
        record::record_failure(
            &leak.file,
            leak.line,
            &leak.condition,
            &leak.expected,
            &leak.actual,
        );
    }

    let mut result = match record::take() {
        Some(result) => result,
        None => {
            // The test body tore down the singleton; nothing to report.
            eprintln!("Error: in-flight result disappeared for '{suite}.{name}'.");
            return 1;
        }
    };
    result.status = if result.failures.is_empty() {
        TestStatus::Passed
    } else {
        TestStatus::Failed
    };

    let stdout = std::io::stdout();
    let mut lock = stdout.lock();
    if codec::write_frame(&mut lock, result.status, &result.failures).is_err() {
        return 1;
    }
    let _ = lock.flush();
    0
}

/// Parent mode: set up the ambient pieces, then run every selected suite
/// sequentially.
fn parent_mode(registry: Registry, cli: Cli) -> Result<u8> {
    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    // A user binary may install its own subscriber first; that is fine.
    let _ = tracing::subscriber::set_global_default(subscriber);

    let config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => config::load_default()?,
    };

    platform::init_colors(config.report.color);
    let ci = platform::ci_enabled() || config.report.ci;

    if let Some(format) = &cli.list_tests {
        return list_tests(&registry, format);
    }

    let default_timeout_ms = cli
        .default_timeout_ms
        .unwrap_or(config.run.default_timeout_ms);

    let reporter = MultiReporter::new().with_reporter(ConsoleReporter::new(ci));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build the supervision runtime")?;

    runtime.block_on(execute(
        &registry,
        cli.suite.as_deref(),
        Duration::from_millis(default_timeout_ms),
        &reporter,
    ))
}

/// The sequential run loop: suites in first-encounter order, tests in
/// declaration order, one supervised child at a time.
async fn execute(
    registry: &Registry,
    suite_filter: Option<&str>,
    default_timeout: Duration,
    reporter: &impl Reporter,
) -> Result<u8> {
    let supervisor = Supervisor::new(default_timeout)
        .context("failed to set up the process supervisor")?;

    let groups: Vec<_> = registry
        .suites()
        .into_iter()
        .filter(|group| suite_filter.is_none_or(|wanted| group.name == wanted))
        .collect();
    let total_tests: usize = groups.iter().map(|group| group.cases.len()).sum();

    reporter.on_run_start(groups.len(), total_tests).await;

    let run_started = Instant::now();
    let mut run = RunResult::new(Local::now());
    let mut all_passed = true;

    for group in groups {
        reporter.on_suite_start(group.name, group.cases.len()).await;
        let mut suite = SuiteResult::new(group.name);

        for case in group.cases {
            let result = supervisor.run_case(case).await;
            if result.status == TestStatus::FrameworkError {
                warn!(
                    suite = %result.suite,
                    test = %result.name,
                    reason = result.reason.as_deref().unwrap_or("unknown"),
                    "supervision failed; continuing with the next test"
                );
            }
            all_passed &= result.status.is_pass();
            suite.record(&result);
            reporter.on_test_finished(&result).await;
            // Results are not retained past the reporter hook.
            drop(result);
        }

        reporter.on_suite_finished(&suite).await;
        run.push_suite(suite);
    }

    run.duration_ms = run_started.elapsed().as_millis() as u64;
    reporter.on_run_finished(&run).await;

    Ok(if all_passed { 0 } else { 1 })
}

/// `--list_tests`: print the registry without running anything.
fn list_tests(registry: &Registry, format: &str) -> Result<u8> {
    match format {
        "json" => {
            let listing = serde_json::to_string_pretty(&registry.entries())
                .context("failed to serialize the test listing")?;
            println!("{listing}");
        }
        _ => {
            for entry in registry.entries() {
                let mut line = format!("{} :: {}", entry.suite, entry.name);
                if entry.death_test {
                    line.push_str("  [death]");
                }
                if entry.timeout_ms != 0 {
                    line.push_str(&format!("  [timeout {} ms]", entry.timeout_ms));
                }
                println!("{line}");
            }
        }
    }
    Ok(0)
}
