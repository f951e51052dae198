//! Death-test evaluation: did the child die the way the test demanded?
//!
//! A death expectation is an acceptance predicate over the child's exit
//! disposition and its captured output. The output side looks for the
//! canonical fatal-assertion line
//!
//! ```text
//! Assertion failed: <expression> && "<message>" on file <path> line <N>
//! ```
//!
//! and extracts the quoted custom message, which is then compared exactly
//! or by Levenshtein similarity. Every unmet criterion becomes one
//! explanatory failure record.

use std::sync::OnceLock;

use regex::Regex;

use crate::platform::{ExitDisposition, signal_name};
use crate::registry::DeathExpectation;
use crate::result::AssertionFailure;

/// Synthesized death failures carry this pseudo file; the reporter omits
/// the location line for them.
const DEATH_FILE: &str = "<death-test>";

/// Levenshtein similarity of two strings, in `[0, 1]`.
///
/// Identical strings (including two empty strings) score 1.0; one edit out
/// of N characters scores `1 - 1/N`. Symmetric by construction.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(&a, &b) as f64 / longest as f64
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut row = vec![0usize; b.len() + 1];
    for (i, &ca) in a.iter().enumerate() {
        row[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            row[j + 1] = substitution.min(previous[j + 1] + 1).min(row[j] + 1);
        }
        std::mem::swap(&mut previous, &mut row);
    }
    previous[b.len()]
}

fn message_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // Forgiving about whitespace around `&&`; anchored on ` on file `
        // so ordinary quoted output does not match.
        Regex::new(r#"&&\s*"([^"]*)"\s+on file "#).expect("static pattern compiles")
    })
}

/// Extracts the custom assertion message from captured output.
///
/// When the output contains several fatal-assertion lines the last one
/// wins; `None` means no custom message was recoverable.
pub fn extract_assert_message(output: &str) -> Option<String> {
    message_pattern()
        .captures_iter(output)
        .last()
        .map(|captures| captures[1].to_string())
}

fn mismatch(condition: &str, expected: String, actual: String) -> AssertionFailure {
    AssertionFailure {
        file: DEATH_FILE.to_string(),
        line: 0,
        condition: condition.to_string(),
        expected,
        actual,
    }
}

fn describe(disposition: &ExitDisposition) -> String {
    match disposition {
        ExitDisposition::Exited(code) => format!("exited with code {code}"),
        ExitDisposition::Signaled(signal) => {
            format!("terminated by signal {signal} ({})", signal_name(*signal))
        }
    }
}

/// Applies a death expectation to an observed termination.
///
/// `Ok(())` means the death test passed; `Err` carries one failure per
/// unmet criterion, in a fixed order (abnormality, signal, exit code,
/// message).
pub fn evaluate(
    expect: &DeathExpectation,
    disposition: &ExitDisposition,
    captured: &str,
) -> Result<(), Vec<AssertionFailure>> {
    let mut failures = Vec::new();

    let abnormal = !matches!(disposition, ExitDisposition::Exited(0));
    if !abnormal {
        failures.push(mismatch(
            "death: process terminates abnormally",
            "non-zero exit code or signal".to_string(),
            "exited with code 0".to_string(),
        ));
        return Err(failures);
    }

    if let Some(expected_signal) = expect.expected_signal {
        match disposition {
            ExitDisposition::Signaled(signal) if *signal == expected_signal => {}
            _ => failures.push(mismatch(
                "death: terminated by the expected signal",
                format!(
                    "signal {expected_signal} ({})",
                    signal_name(expected_signal)
                ),
                describe(disposition),
            )),
        }
    }

    if let Some(expected_code) = expect.expected_exit_code {
        match disposition {
            ExitDisposition::Exited(code) if *code == expected_code => {}
            _ => failures.push(mismatch(
                "death: exited with the expected code",
                format!("exit code {expected_code}"),
                describe(disposition),
            )),
        }
    }

    if let Some(expected_message) = &expect.expected_message {
        match extract_assert_message(captured) {
            None => failures.push(mismatch(
                "death: custom assertion message present",
                expected_message.clone(),
                "<no custom assertion message recovered>".to_string(),
            )),
            Some(actual_message) => {
                if expect.exact_message {
                    if actual_message != *expected_message {
                        failures.push(mismatch(
                            "death: assertion message matches exactly",
                            expected_message.clone(),
                            actual_message,
                        ));
                    }
                } else {
                    let ratio = similarity(expected_message, &actual_message);
                    if ratio < expect.min_similarity {
                        failures.push(mismatch(
                            &format!(
                                "death: assertion message similarity {:.3} >= {:.3}",
                                ratio, expect.min_similarity
                            ),
                            expected_message.clone(),
                            actual_message,
                        ));
                    }
                }
            }
        }
    }

    if failures.is_empty() { Ok(()) } else { Err(failures) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{SIGABRT, SIGSEGV};

    #[test]
    fn similarity_is_symmetric_and_bounded() {
        let pairs = [
            ("kitten", "sitting"),
            ("", "abc"),
            ("abc", ""),
            ("same", "same"),
            ("a", "b"),
            ("longer string here", "another string"),
        ];
        for (a, b) in pairs {
            let forward = similarity(a, b);
            let backward = similarity(b, a);
            assert!((forward - backward).abs() < 1e-12, "{a:?} vs {b:?}");
            assert!((0.0..=1.0).contains(&forward), "{a:?} vs {b:?}: {forward}");
        }
    }

    #[test]
    fn similarity_of_identical_and_empty_strings_is_one() {
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("identical", "identical"), 1.0);
    }

    #[test]
    fn one_edit_out_of_n_scores_one_minus_one_over_n() {
        // 12 characters, one substitution.
        let a = "abcdefghijkl";
        let b = "abcdefghijkX";
        assert!((similarity(a, b) - (1.0 - 1.0 / 12.0)).abs() < 1e-12);
    }

    #[test]
    fn message_extraction_finds_the_quoted_message() {
        let output = "noise before\nAssertion failed: ptr != NULL && \"list must exist\" on file list.rs line 42\n";
        assert_eq!(
            extract_assert_message(output).as_deref(),
            Some("list must exist")
        );
    }

    #[test]
    fn message_extraction_forgives_whitespace_around_the_conjunction() {
        let output = "Assertion failed: ok   &&   \"spaced out\"  on file x.rs line 1\n";
        assert_eq!(extract_assert_message(output).as_deref(), Some("spaced out"));
    }

    #[test]
    fn message_extraction_without_a_custom_message_yields_none() {
        let output = "Assertion failed: ptr != NULL on file list.rs line 42\n";
        assert_eq!(extract_assert_message(output), None);
        assert_eq!(extract_assert_message("no assertion at all"), None);
    }

    #[test]
    fn later_assertion_lines_win() {
        let output = "Assertion failed: a && \"first\" on file f.rs line 1\n\
                      Assertion failed: b && \"second\" on file f.rs line 2\n";
        assert_eq!(extract_assert_message(output).as_deref(), Some("second"));
    }

    #[test]
    fn expected_signal_accepts_only_that_signal() {
        let expect = DeathExpectation::signal(SIGSEGV);
        assert!(evaluate(&expect, &ExitDisposition::Signaled(SIGSEGV), "").is_ok());

        let err = evaluate(&expect, &ExitDisposition::Signaled(SIGABRT), "").unwrap_err();
        assert_eq!(err.len(), 1);
        assert!(err[0].expected.contains("SIGSEGV"));

        // Requesting a signal and observing an exit code is a channel mismatch.
        let err = evaluate(&expect, &ExitDisposition::Exited(1), "").unwrap_err();
        assert!(err[0].actual.contains("exited with code 1"));
    }

    #[test]
    fn expected_exit_code_accepts_only_that_code() {
        let expect = DeathExpectation::exit_code(3);
        assert!(evaluate(&expect, &ExitDisposition::Exited(3), "").is_ok());
        assert!(evaluate(&expect, &ExitDisposition::Exited(4), "").is_err());
        assert!(evaluate(&expect, &ExitDisposition::Signaled(SIGABRT), "").is_err());
    }

    #[test]
    fn normal_exit_fails_any_death_expectation() {
        let err = evaluate(&DeathExpectation::any(), &ExitDisposition::Exited(0), "")
            .unwrap_err();
        assert_eq!(err.len(), 1);
        assert!(err[0].actual.contains("code 0"));
    }

    #[test]
    fn exact_message_mismatch_reports_both_sides() {
        let expect = DeathExpectation::signal(SIGABRT).with_exact_message("other message");
        let captured =
            "Assertion failed: x && \"expected custom message\" on file t.rs line 9\n";
        let err = evaluate(&expect, &ExitDisposition::Signaled(SIGABRT), captured).unwrap_err();
        assert_eq!(err.len(), 1);
        assert_eq!(err[0].expected, "other message");
        assert_eq!(err[0].actual, "expected custom message");
    }

    #[test]
    fn similar_message_passes_at_the_default_threshold() {
        let expect = DeathExpectation::signal(SIGABRT).with_message("list must not be empty!");
        // One character off out of 23.
        let captured =
            "Assertion failed: x && \"list must not be empty?\" on file t.rs line 9\n";
        assert!(evaluate(&expect, &ExitDisposition::Signaled(SIGABRT), captured).is_ok());
    }

    #[test]
    fn missing_message_is_reported_when_one_is_expected() {
        let expect = DeathExpectation::any().with_message("anything");
        let err = evaluate(&expect, &ExitDisposition::Signaled(SIGABRT), "plain crash output")
            .unwrap_err();
        assert!(err[0].actual.contains("no custom assertion message"));
    }

    #[test]
    fn every_unmet_criterion_gets_its_own_record() {
        let expect = DeathExpectation::signal(SIGSEGV)
            .with_exact_message("msg");
        let err = evaluate(&expect, &ExitDisposition::Exited(7), "").unwrap_err();
        // Signal mismatch and missing message.
        assert_eq!(err.len(), 2);
    }
}
