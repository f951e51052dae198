//! Test reporting.
//!
//! The runner drives a [`Reporter`] through five hooks, in a fixed order:
//! run-start, then per suite a suite-start, one test-finished per test, a
//! suite-finish, and finally run-finished. Results are passed by reference
//! and must not be retained past the call; the runner drops each test
//! result as soon as the hook returns.
//!
//! # Built-in Reporters
//!
//! | Reporter | Description |
//! |----------|-------------|
//! | [`ConsoleReporter`] | Colorized terminal output with an optional CI block |
//! | [`MultiReporter`] | Forwards events to several reporters |
//! | [`NullReporter`] | Discards all events (for testing) |

use async_trait::async_trait;
use chrono::Local;
use console::style;

use crate::result::{RunResult, SuiteResult, TestResult, TestStatus};

/// Trait for receiving test execution events.
///
/// Hooks fire strictly sequentially: the runner awaits one child at a time,
/// so implementations never see concurrent calls.
#[async_trait]
pub trait Reporter: Send + Sync {
    /// Called once before the first suite starts.
    async fn on_run_start(&self, total_suites: usize, total_tests: usize);

    /// Called when a suite's first test is about to run.
    async fn on_suite_start(&self, suite: &str, test_count: usize);

    /// Called exactly once per test with its final result.
    async fn on_test_finished(&self, result: &TestResult);

    /// Called when the last test of a suite has finished.
    async fn on_suite_finished(&self, suite: &SuiteResult);

    /// Called once after the last suite.
    async fn on_run_finished(&self, run: &RunResult);
}

/// A reporter that discards all events.
pub struct NullReporter;

#[async_trait]
impl Reporter for NullReporter {
    async fn on_run_start(&self, _total_suites: usize, _total_tests: usize) {}
    async fn on_suite_start(&self, _suite: &str, _test_count: usize) {}
    async fn on_test_finished(&self, _result: &TestResult) {}
    async fn on_suite_finished(&self, _suite: &SuiteResult) {}
    async fn on_run_finished(&self, _run: &RunResult) {}
}

/// A reporter that forwards events to multiple child reporters, in the
/// order they were added.
pub struct MultiReporter {
    reporters: Vec<Box<dyn Reporter>>,
}

impl MultiReporter {
    pub fn new() -> Self {
        Self {
            reporters: Vec::new(),
        }
    }

    /// Adds a reporter to receive events. Returns `self` for chaining.
    pub fn with_reporter<R: Reporter + 'static>(mut self, reporter: R) -> Self {
        self.reporters.push(Box::new(reporter));
        self
    }
}

impl Default for MultiReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Reporter for MultiReporter {
    async fn on_run_start(&self, total_suites: usize, total_tests: usize) {
        for reporter in &self.reporters {
            reporter.on_run_start(total_suites, total_tests).await;
        }
    }

    async fn on_suite_start(&self, suite: &str, test_count: usize) {
        for reporter in &self.reporters {
            reporter.on_suite_start(suite, test_count).await;
        }
    }

    async fn on_test_finished(&self, result: &TestResult) {
        for reporter in &self.reporters {
            reporter.on_test_finished(result).await;
        }
    }

    async fn on_suite_finished(&self, suite: &SuiteResult) {
        for reporter in &self.reporters {
            reporter.on_suite_finished(suite).await;
        }
    }

    async fn on_run_finished(&self, run: &RunResult) {
        for reporter in &self.reporters {
            reporter.on_run_finished(run).await;
        }
    }
}

/// Terminal reporter: a banner per suite, one status line per test,
/// failure details, per-suite and overall summaries, and, in CI mode,
/// four machine-readable summary lines.
pub struct ConsoleReporter {
    ci: bool,
}

impl ConsoleReporter {
    /// `ci` appends the machine-readable block to the final summary.
    pub fn new(ci: bool) -> Self {
        Self { ci }
    }
}

#[async_trait]
impl Reporter for ConsoleReporter {
    async fn on_run_start(&self, _total_suites: usize, total_tests: usize) {
        println!(
            "{}",
            style(format!(
                "Running {} test(s), started {}",
                total_tests,
                Local::now().format("%Y-%m-%d %H:%M:%S")
            ))
            .dim()
        );
    }

    async fn on_suite_start(&self, suite: &str, _test_count: usize) {
        println!();
        println!("{}", style(format!("Tests for {suite}")).blue());
        println!("{}", style("=".repeat(suite.len() + 10)).blue());
    }

    async fn on_test_finished(&self, result: &TestResult) {
        let label = match result.status {
            TestStatus::Passed => style(result.status.label()).green(),
            TestStatus::DeathPassed => style(result.status.label()).green(),
            TestStatus::Timeout => style(result.status.label()).yellow(),
            TestStatus::FrameworkError => style(result.status.label()).red().bold(),
            _ => style(result.status.label()).red(),
        };
        println!("\n{}: {} ({} ms)", result.name, label, result.duration_ms);

        for failure in &result.failures {
            print_failure(failure);
        }
        if let Some(reason) = &result.reason {
            println!("   Reason: {reason}");
        }
        if result.status == TestStatus::Crashed && !result.captured_output.is_empty() {
            println!("   Got output:");
            println!("---");
            println!("{}", result.captured_output.trim_end());
            println!("---");
        }
    }

    async fn on_suite_finished(&self, suite: &SuiteResult) {
        print!(
            "\n{}: {}, {}: {}, Total: {}, Details: ",
            style("Passed").green(),
            style(suite.passed).green(),
            style("Failed").red(),
            style(suite.failed()).red(),
            suite.total,
        );
        for glyph in suite.glyphs.chars() {
            match glyph {
                '+' => print!("{}", style('+').green()),
                '-' => print!("{}", style('-').red()),
                other => print!("{other}"),
            }
        }
        println!();
    }

    async fn on_run_finished(&self, run: &RunResult) {
        let bar = style("========================================").blue();
        println!();
        println!("{bar}");
        println!("{}", style(" Overall Summary").blue());
        println!("{bar}");
        println!("Suites run:    {}", run.total_suites);
        println!("Total tests:   {}", run.total_tests);
        println!("{}", style(format!("Passed:        {}", run.passed_tests)).green());
        println!("{}", style(format!("Failed:        {}", run.failed_tests())).red());
        println!("Success rate:  {:.2}%", run.success_rate());
        println!("{bar}");

        if self.ci {
            println!();
            for line in ci_block(run) {
                println!("{line}");
            }
        }
    }
}

/// The four machine-readable CI lines: per-suite passed/total counts,
/// glyph strings, passed counts, and pass ratios.
fn ci_block(run: &RunResult) -> [String; 4] {
    let counts = run
        .suites
        .iter()
        .map(|s| format!("{}/{}", s.passed, s.total))
        .collect::<Vec<_>>()
        .join(" ");

    let glyphs = run
        .suites
        .iter()
        .map(|s| {
            s.glyphs
                .chars()
                .map(String::from)
                .collect::<Vec<_>>()
                .join(";")
        })
        .collect::<Vec<_>>()
        .join(";;");

    let passed = run
        .suites
        .iter()
        .map(|s| s.passed.to_string())
        .collect::<Vec<_>>()
        .join(";");

    let ratios = run
        .suites
        .iter()
        .map(|s| format!("{:.3}", s.pass_ratio()))
        .collect::<Vec<_>>()
        .join(";");

    [counts, glyphs, passed, ratios]
}

fn print_failure(failure: &crate::result::AssertionFailure) {
    // [STDOUT] comparisons routinely contain newlines and other control
    // characters; escape them so the report stays one line per field.
    let stdout_tagged = failure.condition.starts_with("[STDOUT]");
    let show = |text: &str| {
        if stdout_tagged {
            escape_control(text)
        } else {
            text.to_string()
        }
    };

    println!("   Assertion failed: {}", show(&failure.condition));
    if failure.line > 0 {
        println!("      At: {}:{}", failure.file, failure.line);
    }
    if !failure.expected.is_empty() {
        println!("   Expected: {}", style(show(&failure.expected)).green());
    }
    if !failure.actual.is_empty() {
        println!("   Got: {}", style(show(&failure.actual)).red());
    }
}

/// Renders control characters visibly (`\n`, `\t`, `\r`, `\xNN`).
fn escape_control(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}
