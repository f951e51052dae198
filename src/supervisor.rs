//! Process supervision: one child per test.
//!
//! For each descriptor the supervisor re-spawns the current executable with
//! `--run_test <suite> <test>`, captures the child's stdout and stderr into
//! a single buffer, enforces the effective per-test timeout, and interprets
//! the termination into a [`TestResult`].
//!
//! # Pipe discipline
//!
//! Both output streams are piped and drained concurrently while the parent
//! waits for the child; the buffers are then concatenated (stdout first)
//! into one contiguous captured-output buffer. The child's result frame
//! lives somewhere in that buffer and is parsed out by [`crate::codec`];
//! the buffer as a whole is kept for diagnostics.
//!
//! # Timeout
//!
//! The drain-and-wait future races a timer. On expiry the child is killed
//! with an uncatchable signal (`SIGKILL` / `TerminateProcess`), whatever
//! output had been drained by then is preserved, and the result is
//! [`TestStatus::Timeout`].

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::codec;
use crate::death;
use crate::platform::{self, ExitDisposition};
use crate::registry::{DeathExpectation, TestCase};
use crate::result::{TestResult, TestStatus};

/// Errors on the parent side of supervision. These never abort the run;
/// the affected test is reported as [`TestStatus::FrameworkError`].
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to locate the test executable: {0}")]
    Executable(#[source] std::io::Error),

    #[error("failed to spawn child process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed to read child output: {0}")]
    Read(#[source] std::io::Error),

    #[error("failed to wait for child process: {0}")]
    Wait(#[source] std::io::Error),
}

/// Spawns and supervises one child process per test.
pub struct Supervisor {
    executable: PathBuf,
    default_timeout: Duration,
}

impl Supervisor {
    /// Creates a supervisor that re-executes the current binary.
    pub fn new(default_timeout: Duration) -> Result<Self, SupervisorError> {
        let executable = std::env::current_exe().map_err(SupervisorError::Executable)?;
        Ok(Self {
            executable,
            default_timeout,
        })
    }

    /// Effective timeout for a descriptor: its own override, or the
    /// run-wide default.
    pub fn effective_timeout(&self, case: &TestCase) -> Duration {
        if case.timeout_ms == 0 {
            self.default_timeout
        } else {
            Duration::from_millis(case.timeout_ms)
        }
    }

    /// Runs one test in a child and returns its result. Never fails: a
    /// supervision error becomes a framework-error result.
    pub async fn run_case(&self, case: &TestCase) -> TestResult {
        let started = Instant::now();
        match self.supervise(case).await {
            Ok(result) => result,
            Err(error) => {
                let mut result = TestResult::new(&case.suite, &case.name);
                result.status = TestStatus::FrameworkError;
                result.duration_ms = started.elapsed().as_millis() as u64;
                result.reason = Some(error.to_string());
                result
            }
        }
    }

    async fn supervise(&self, case: &TestCase) -> Result<TestResult, SupervisorError> {
        let timeout = self.effective_timeout(case);
        debug!(
            suite = %case.suite,
            test = %case.name,
            timeout_ms = timeout.as_millis() as u64,
            "spawning child"
        );

        let mut command = tokio::process::Command::new(&self.executable);
        // Command passes each argument through byte-for-byte, so test
        // names containing spaces, quotes, or other printable characters
        // survive unchanged.
        command
            .arg("--run_test")
            .arg(&case.suite)
            .arg(&case.name)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let started = Instant::now();
        let mut child = command.spawn().map_err(SupervisorError::Spawn)?;
        let mut stdout = child.stdout.take().expect("stdout was piped");
        let mut stderr = child.stderr.take().expect("stderr was piped");

        let mut out_buf: Vec<u8> = Vec::new();
        let mut err_buf: Vec<u8> = Vec::new();

        let disposition = {
            let drain = async {
                let (out_read, err_read) = tokio::join!(
                    stdout.read_to_end(&mut out_buf),
                    stderr.read_to_end(&mut err_buf),
                );
                out_read.map_err(SupervisorError::Read)?;
                err_read.map_err(SupervisorError::Read)?;
                child.wait().await.map_err(SupervisorError::Wait)
            };
            match tokio::time::timeout(timeout, drain).await {
                Ok(status) => Some(platform::disposition(&status?)),
                Err(_elapsed) => None,
            }
        };

        if disposition.is_none() {
            // Partial reads stay in the buffers; the drain future only
            // borrowed them.
            let _ = child.start_kill();
            let _ = child.wait().await;
        }

        let mut result = TestResult::new(&case.suite, &case.name);
        result.duration_ms = started.elapsed().as_millis() as u64;
        out_buf.extend_from_slice(&err_buf);
        result.captured_output = String::from_utf8_lossy(&out_buf).into_owned();

        match disposition {
            None => {
                result.status = TestStatus::Timeout;
                result.reason = Some(format!(
                    "Exceeded timeout of {} ms.",
                    timeout.as_millis()
                ));
            }
            Some(disposition) => classify(&mut result, disposition, case.death.as_ref()),
        }
        Ok(result)
    }
}

/// Interprets a child's exit disposition into a status.
///
/// With a death expectation the expectation's predicate decides; without
/// one, a clean exit defers to the result frame and everything else is a
/// crash with a derived reason.
pub(crate) fn classify(
    result: &mut TestResult,
    disposition: ExitDisposition,
    death: Option<&DeathExpectation>,
) {
    if let Some(expectation) = death {
        match death::evaluate(expectation, &disposition, &result.captured_output) {
            Ok(()) => result.status = TestStatus::DeathPassed,
            Err(failures) => {
                result.status = TestStatus::Failed;
                result.failures.extend(failures);
            }
        }
        return;
    }

    match disposition {
        ExitDisposition::Exited(0) => {
            let frame = codec::parse_frame(&result.captured_output);
            result.failures = frame.failures;
            let reported_failed = frame.status == Some(TestStatus::Failed);
            result.status = if reported_failed || !result.failures.is_empty() {
                TestStatus::Failed
            } else {
                // The child's reported status prevails when present; a
                // clean exit with no frame at all still counts as passed.
                TestStatus::Passed
            };
        }
        ExitDisposition::Exited(code) => {
            result.status = TestStatus::Crashed;
            result.reason = Some(
                platform::crash_reason(code)
                    .unwrap_or_else(|| format!("Exited with code {code}.")),
            );
        }
        ExitDisposition::Signaled(signal) => {
            result.status = TestStatus::Crashed;
            result.reason = Some(format!(
                "Terminated by signal: {signal} ({}).",
                platform::signal_name(signal)
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{EXIT_REALLOC_UNTRACKED, EXIT_RELEASE_UNTRACKED, SIGSEGV};
    use crate::result::AssertionFailure;

    fn result_with_output(output: &str) -> TestResult {
        let mut result = TestResult::new("suite", "test");
        result.captured_output = output.to_string();
        result
    }

    fn framed(status: TestStatus, failures: &[AssertionFailure]) -> String {
        let mut wire = Vec::new();
        codec::write_frame(&mut wire, status, failures).expect("in-memory write");
        String::from_utf8(wire).expect("frame is ascii")
    }

    #[test]
    fn clean_exit_with_clean_frame_passes() {
        let mut result = result_with_output(&framed(TestStatus::Passed, &[]));
        classify(&mut result, ExitDisposition::Exited(0), None);
        assert_eq!(result.status, TestStatus::Passed);
        assert!(result.failures.is_empty());
    }

    #[test]
    fn clean_exit_with_recorded_failures_fails() {
        let failure = AssertionFailure {
            file: "t.rs".into(),
            line: 3,
            condition: "x == y".into(),
            expected: "1".into(),
            actual: "2".into(),
        };
        let mut result = result_with_output(&framed(TestStatus::Failed, &[failure.clone()]));
        classify(&mut result, ExitDisposition::Exited(0), None);
        assert_eq!(result.status, TestStatus::Failed);
        assert_eq!(result.failures, vec![failure]);
    }

    #[test]
    fn clean_exit_with_no_frame_is_inferred_as_passed() {
        let mut result = result_with_output("some stray output, no frame");
        classify(&mut result, ExitDisposition::Exited(0), None);
        assert_eq!(result.status, TestStatus::Passed);
    }

    #[test]
    fn framework_fatal_exit_codes_carry_their_reason() {
        let mut result = result_with_output("");
        classify(&mut result, ExitDisposition::Exited(EXIT_REALLOC_UNTRACKED), None);
        assert_eq!(result.status, TestStatus::Crashed);
        assert!(result.reason.as_deref().unwrap().contains("resize"));

        let mut result = result_with_output("");
        classify(&mut result, ExitDisposition::Exited(EXIT_RELEASE_UNTRACKED), None);
        assert_eq!(result.status, TestStatus::Crashed);
        assert!(result.reason.as_deref().unwrap().contains("release"));
    }

    #[test]
    fn nonzero_exit_without_expectation_is_a_crash() {
        let mut result = result_with_output("");
        classify(&mut result, ExitDisposition::Exited(42), None);
        assert_eq!(result.status, TestStatus::Crashed);
        assert_eq!(result.reason.as_deref(), Some("Exited with code 42."));
    }

    #[test]
    fn signal_without_expectation_is_a_crash() {
        let mut result = result_with_output("");
        classify(&mut result, ExitDisposition::Signaled(SIGSEGV), None);
        assert_eq!(result.status, TestStatus::Crashed);
        assert!(result.reason.as_deref().unwrap().contains("SIGSEGV"));
    }

    #[test]
    fn matching_death_expectation_passes() {
        let expect = DeathExpectation::signal(SIGSEGV);
        let mut result = result_with_output("");
        classify(&mut result, ExitDisposition::Signaled(SIGSEGV), Some(&expect));
        assert_eq!(result.status, TestStatus::DeathPassed);
    }

    #[test]
    fn unmet_death_expectation_fails_with_explanations() {
        let expect = DeathExpectation::signal(SIGSEGV);
        let mut result = result_with_output("");
        classify(&mut result, ExitDisposition::Exited(0), Some(&expect));
        assert_eq!(result.status, TestStatus::Failed);
        assert!(!result.failures.is_empty());
    }

    #[test]
    fn per_case_timeout_overrides_the_default() {
        let supervisor = Supervisor {
            executable: PathBuf::from("/unused"),
            default_timeout: Duration::from_millis(3000),
        };
        let default_case = TestCase::new("s", "t", || {});
        assert_eq!(
            supervisor.effective_timeout(&default_case),
            Duration::from_millis(3000)
        );
        let quick = default_case.clone().with_timeout_ms(250);
        assert_eq!(
            supervisor.effective_timeout(&quick),
            Duration::from_millis(250)
        );
    }
}
