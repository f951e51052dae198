//! In-memory result model: assertion failures, per-test results, per-suite
//! summaries, and the aggregated run result.
//!
//! Ownership is strictly top-down: a [`TestResult`] owns its failures, a
//! [`SuiteResult`] keeps only a compact summary of the tests it saw, and a
//! [`RunResult`] owns the suite summaries it needs for the final report.
//! Test results are handed to the reporter once and dropped immediately
//! afterwards, so parent-side memory stays bounded regardless of run length.

use chrono::{DateTime, Local};

/// Final disposition of a single test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestStatus {
    /// Not yet executed. Only ever observed inside the child before the test
    /// body finishes.
    Pending,
    /// The test ran to completion without recording a failure.
    Passed,
    /// The test ran to completion and recorded at least one failure.
    Failed,
    /// The child terminated abnormally without a matching death expectation.
    Crashed,
    /// The child exceeded its time budget and was killed.
    Timeout,
    /// The child terminated abnormally and matched its death expectation.
    DeathPassed,
    /// The parent could not supervise the child (spawn, pipe, or wait failed).
    FrameworkError,
}

impl TestStatus {
    /// Integer representation used on the child→parent wire.
    pub fn as_wire(self) -> i32 {
        match self {
            TestStatus::Pending => 0,
            TestStatus::Passed => 1,
            TestStatus::Failed => 2,
            TestStatus::Crashed => 3,
            TestStatus::Timeout => 4,
            TestStatus::DeathPassed => 5,
            TestStatus::FrameworkError => 6,
        }
    }

    /// Inverse of [`as_wire`](Self::as_wire); unknown values yield `None`.
    pub fn from_wire(value: i32) -> Option<Self> {
        match value {
            0 => Some(TestStatus::Pending),
            1 => Some(TestStatus::Passed),
            2 => Some(TestStatus::Failed),
            3 => Some(TestStatus::Crashed),
            4 => Some(TestStatus::Timeout),
            5 => Some(TestStatus::DeathPassed),
            6 => Some(TestStatus::FrameworkError),
            _ => None,
        }
    }

    /// Whether this status counts toward the run's success.
    pub fn is_pass(self) -> bool {
        matches!(self, TestStatus::Passed | TestStatus::DeathPassed)
    }

    /// Console label for this status.
    pub fn label(self) -> &'static str {
        match self {
            TestStatus::Pending => "PENDING",
            TestStatus::Passed => "PASSED",
            TestStatus::Failed => "FAILED",
            TestStatus::Crashed => "CRASHED",
            TestStatus::Timeout => "TIMEOUT",
            TestStatus::DeathPassed => "PASSED(death)",
            TestStatus::FrameworkError => "FRAMEWORK ERROR",
        }
    }
}

/// One recorded assertion failure.
///
/// Failures are appended in the order the sink was called and never
/// reordered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionFailure {
    pub file: String,
    pub line: u32,
    pub condition: String,
    pub expected: String,
    pub actual: String,
}

/// The complete result of a single test, as seen by the reporter.
#[derive(Debug)]
pub struct TestResult {
    pub suite: String,
    pub name: String,
    pub status: TestStatus,
    /// Wall-clock duration measured by the parent around the supervised wait.
    pub duration_ms: u64,
    /// Everything the child wrote to stdout and stderr, including the result
    /// frame. May be empty.
    pub captured_output: String,
    pub failures: Vec<AssertionFailure>,
    /// Diagnostic text for Crashed / Timeout / FrameworkError results.
    pub reason: Option<String>,
}

impl TestResult {
    pub fn new(suite: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            suite: suite.into(),
            name: name.into(),
            status: TestStatus::Pending,
            duration_ms: 0,
            captured_output: String::new(),
            failures: Vec::new(),
            reason: None,
        }
    }

    /// One-character outcome glyph for the suite summary string.
    pub fn glyph(&self) -> char {
        if self.status.is_pass() { '+' } else { '-' }
    }
}

/// Compact per-suite summary, retained for the final report.
#[derive(Debug, Clone)]
pub struct SuiteResult {
    pub name: String,
    pub total: usize,
    pub passed: usize,
    /// One `+` or `-` per test, in execution order.
    pub glyphs: String,
}

impl SuiteResult {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            total: 0,
            passed: 0,
            glyphs: String::new(),
        }
    }

    /// Folds a finished test into the summary.
    pub fn record(&mut self, result: &TestResult) {
        self.total += 1;
        if result.status.is_pass() {
            self.passed += 1;
        }
        self.glyphs.push(result.glyph());
    }

    pub fn failed(&self) -> usize {
        self.total - self.passed
    }

    /// Pass ratio in `[0, 1]`; an empty suite counts as fully passing.
    pub fn pass_ratio(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.passed as f64 / self.total as f64
        }
    }
}

/// Aggregated results of an entire run.
#[derive(Debug)]
pub struct RunResult {
    pub started_at: DateTime<Local>,
    pub total_suites: usize,
    pub total_tests: usize,
    pub passed_tests: usize,
    pub duration_ms: u64,
    pub suites: Vec<SuiteResult>,
}

impl RunResult {
    pub fn new(started_at: DateTime<Local>) -> Self {
        Self {
            started_at,
            total_suites: 0,
            total_tests: 0,
            passed_tests: 0,
            duration_ms: 0,
            suites: Vec::new(),
        }
    }

    /// Folds a finished suite into the run totals.
    pub fn push_suite(&mut self, suite: SuiteResult) {
        self.total_suites += 1;
        self.total_tests += suite.total;
        self.passed_tests += suite.passed;
        self.suites.push(suite);
    }

    pub fn failed_tests(&self) -> usize {
        self.total_tests - self.passed_tests
    }

    /// Returns `true` if every test passed (normally or as a death test).
    pub fn success(&self) -> bool {
        self.failed_tests() == 0
    }

    /// Conventional process exit code: 0 on success, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.success() { 0 } else { 1 }
    }

    /// Overall pass percentage; an empty run counts as 100%.
    pub fn success_rate(&self) -> f64 {
        if self.total_tests == 0 {
            100.0
        } else {
            self.passed_tests as f64 / self.total_tests as f64 * 100.0
        }
    }
}
