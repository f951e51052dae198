//! The assertion recorder: the in-flight test result singleton, the failure
//! sink, and the capture buffer behind the stdout assertions.
//!
//! Everything user-facing reduces to [`record_failure`]: the check macros
//! format their operands and call it, the leak checker synthesizes one
//! failure through it, and the stdout comparisons report through it.
//! Failures never unwind: a test keeps running after a failed check and
//! every failure becomes one record, in call order.
//!
//! The singleton exists only inside a child process: the runner installs it
//! with [`begin`] before invoking the test body and takes it back with
//! [`take`] for serialization. Calls to the sink with no test in flight are
//! ignored.

use std::fmt;
use std::io::Write;
use std::sync::{Mutex, MutexGuard};

use crate::result::{AssertionFailure, TestResult};

struct CurrentTest {
    result: TestResult,
    stdout_capture: String,
}

static CURRENT: Mutex<Option<CurrentTest>> = Mutex::new(None);

fn current() -> MutexGuard<'static, Option<CurrentTest>> {
    CURRENT.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Installs the in-flight result for `suite.name`, replacing any previous
/// one. Called once at child-mode entry.
pub(crate) fn begin(suite: &str, name: &str) {
    *current() = Some(CurrentTest {
        result: TestResult::new(suite, name),
        stdout_capture: String::new(),
    });
}

/// Removes and returns the in-flight result.
pub(crate) fn take() -> Option<TestResult> {
    current().take().map(|t| t.result)
}

/// The assertion sink. Appends one failure record to the in-flight test.
pub fn record_failure(file: &str, line: u32, condition: &str, expected: &str, actual: &str) {
    if let Some(test) = current().as_mut() {
        test.result.failures.push(AssertionFailure {
            file: file.to_string(),
            line,
            condition: condition.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
}

/// Number of failures recorded so far for the in-flight test.
pub fn failure_count() -> usize {
    current().as_ref().map_or(0, |t| t.result.failures.len())
}

/// Byte length of the capture buffer; pair with [`captured_since`] to
/// observe only the output of a code region.
pub fn captured_len() -> usize {
    current().as_ref().map_or(0, |t| t.stdout_capture.len())
}

/// The capture buffer's content from byte offset `start` on.
pub fn captured_since(start: usize) -> String {
    current()
        .as_ref()
        .and_then(|t| t.stdout_capture.get(start..))
        .unwrap_or_default()
        .to_string()
}

/// Writes formatted text to the real stdout (unbuffered) and mirrors it
/// into the capture buffer. Backs the [`cout!`](crate::cout) and
/// [`coutln!`](crate::coutln) macros.
pub fn emit(args: fmt::Arguments<'_>) {
    let text = args.to_string();
    {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        let _ = lock.write_all(text.as_bytes());
        let _ = lock.flush();
    }
    if let Some(test) = current().as_mut() {
        test.stdout_capture.push_str(&text);
    }
}

/// How [`check_stdout`] compares the produced output to the expectation.
#[derive(Debug, Clone, Copy)]
pub enum StdoutMode {
    /// Byte-for-byte equality.
    Exact,
    /// Equality after collapsing all whitespace runs.
    Normalized,
    /// Levenshtein similarity at least the given ratio.
    Similar(f64),
}

/// Compares captured output against an expectation and records a
/// `[STDOUT]`-tagged failure on mismatch.
pub fn check_stdout(
    file: &str,
    line: u32,
    source: &str,
    expected: &str,
    actual: &str,
    mode: StdoutMode,
) {
    let (ok, condition) = match mode {
        StdoutMode::Exact => (expected == actual, format!("[STDOUT] {source}")),
        StdoutMode::Normalized => {
            let norm = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ");
            (
                norm(expected) == norm(actual),
                format!("[STDOUT] {source} (whitespace-normalized)"),
            )
        }
        StdoutMode::Similar(min) => {
            let ratio = crate::death::similarity(expected, actual);
            (
                ratio >= min,
                format!("[STDOUT] {source} (similarity {ratio:.3} >= {min:.3})"),
            )
        }
    };
    if !ok {
        record_failure(file, line, &condition, expected, actual);
    }
}

/// Prints the canonical fatal-assertion line and aborts the process.
///
/// This is the death-test trigger: the message lands in the captured output
/// where the parent's death evaluator extracts it.
pub fn fatal_assert_fail(condition: &str, message: Option<&str>, file: &str, line: u32) -> ! {
    match message {
        Some(msg) => eprintln!("Assertion failed: {condition} && \"{msg}\" on file {file} line {line}"),
        None => eprintln!("Assertion failed: {condition} on file {file} line {line}"),
    }
    std::process::abort();
}

/// Records a failure unless the condition holds.
#[macro_export]
macro_rules! check {
    ($cond:expr) => {{
        if !$cond {
            $crate::record::record_failure(file!(), line!(), stringify!($cond), "true", "false");
        }
    }};
}

/// Records a failure if the condition holds.
#[macro_export]
macro_rules! refute {
    ($cond:expr) => {{
        if $cond {
            $crate::record::record_failure(file!(), line!(), stringify!($cond), "false", "true");
        }
    }};
}

/// Records a failure unless the two operands compare equal.
#[macro_export]
macro_rules! check_eq {
    ($expected:expr, $actual:expr) => {{
        let expected = $expected;
        let actual = $actual;
        if expected != actual {
            $crate::record::record_failure(
                file!(),
                line!(),
                concat!(stringify!($expected), " == ", stringify!($actual)),
                &format!("{:?}", expected),
                &format!("{:?}", actual),
            );
        }
    }};
}

/// Records a failure if the two operands compare equal.
#[macro_export]
macro_rules! check_ne {
    ($left:expr, $right:expr) => {{
        let left = $left;
        let right = $right;
        if left == right {
            $crate::record::record_failure(
                file!(),
                line!(),
                concat!(stringify!($left), " != ", stringify!($right)),
                &format!("not {:?}", left),
                &format!("{:?}", right),
            );
        }
    }};
}

/// Prints to stdout through the harness so stdout assertions can observe
/// the output.
#[macro_export]
macro_rules! cout {
    ($($arg:tt)*) => {
        $crate::record::emit(::std::format_args!($($arg)*))
    };
}

/// [`cout!`](crate::cout) with a trailing newline.
#[macro_export]
macro_rules! coutln {
    () => { $crate::cout!("\n") };
    ($($arg:tt)*) => {{
        $crate::cout!($($arg)*);
        $crate::cout!("\n");
    }};
}

/// Runs a block and records a `[STDOUT]` failure unless it printed exactly
/// the expected text (via [`cout!`](crate::cout)/[`coutln!`](crate::coutln)).
#[macro_export]
macro_rules! check_stdout_eq {
    ($body:expr, $expected:expr) => {{
        let __start = $crate::record::captured_len();
        { $body; }
        let __output = $crate::record::captured_since(__start);
        $crate::record::check_stdout(
            file!(),
            line!(),
            stringify!($body),
            $expected,
            &__output,
            $crate::record::StdoutMode::Exact,
        );
    }};
}

/// Like [`check_stdout_eq!`](crate::check_stdout_eq) but compares after
/// collapsing whitespace runs.
#[macro_export]
macro_rules! check_stdout_eq_normalized {
    ($body:expr, $expected:expr) => {{
        let __start = $crate::record::captured_len();
        { $body; }
        let __output = $crate::record::captured_since(__start);
        $crate::record::check_stdout(
            file!(),
            line!(),
            stringify!($body),
            $expected,
            &__output,
            $crate::record::StdoutMode::Normalized,
        );
    }};
}

/// Like [`check_stdout_eq!`](crate::check_stdout_eq) but accepts output
/// whose Levenshtein similarity to the expectation is at least `$min`.
#[macro_export]
macro_rules! check_stdout_similar {
    ($body:expr, $expected:expr, $min:expr) => {{
        let __start = $crate::record::captured_len();
        { $body; }
        let __output = $crate::record::captured_since(__start);
        $crate::record::check_stdout(
            file!(),
            line!(),
            stringify!($body),
            $expected,
            &__output,
            $crate::record::StdoutMode::Similar($min),
        );
    }};
}

/// Aborts the process with the canonical assertion line when the condition
/// is false. With a message argument the line carries the quoted custom
/// message that death expectations can match on.
#[macro_export]
macro_rules! fatal_assert {
    ($cond:expr) => {{
        if !$cond {
            $crate::record::fatal_assert_fail(stringify!($cond), None, file!(), line!());
        }
    }};
    ($cond:expr, $msg:expr) => {{
        if !$cond {
            $crate::record::fatal_assert_fail(stringify!($cond), Some($msg), file!(), line!());
        }
    }};
}
