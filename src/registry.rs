//! Test declaration and enumeration.
//!
//! Tests are declared explicitly: the user's `main` builds a [`Registry`],
//! [`declare`](Registry::declare)s one [`TestCase`] per test, and hands the
//! registry to [`crate::run`]. Enumeration order is declaration order on
//! every platform, and the runner groups consecutive descriptors that share
//! a suite name into one suite; declarations are never reordered across
//! the registry.
//!
//! # Example
//!
//! ```
//! use cordon::{DeathExpectation, Registry, TestCase};
//!
//! fn adds() { cordon::check_eq!(4, 2 + 2); }
//! fn aborts() { cordon::fatal_assert!(false, "expected blow-up"); }
//!
//! let mut registry = Registry::new();
//! registry.declare(TestCase::new("Arithmetic", "adds small numbers", adds));
//! registry.declare(
//!     TestCase::new("Arithmetic", "aborts on demand", aborts)
//!         .with_death(DeathExpectation::signal(cordon::platform::SIGABRT)),
//! );
//! assert_eq!(registry.len(), 2);
//! ```

use serde::Serialize;

/// A test body. Runs on the child's main thread; communicates failures
/// through the assertion sink.
pub type TestFn = fn();

/// Default minimum similarity for non-exact death-test message matching.
pub const DEFAULT_MIN_SIMILARITY: f64 = 0.95;

/// What a death test expects of its child's termination.
///
/// An expectation with neither a signal nor an exit code accepts any
/// abnormal termination. Requesting a signal and observing an exit code is
/// a mismatch, and vice versa.
#[derive(Debug, Clone, PartialEq)]
pub struct DeathExpectation {
    /// Signal the child must die by; `None` means "don't care".
    pub expected_signal: Option<i32>,
    /// Exit code the child must exit with; `None` means "don't care".
    pub expected_exit_code: Option<i32>,
    /// Minimum similarity ratio for non-exact message comparison.
    pub min_similarity: f64,
    /// Custom assertion message expected in the captured output.
    pub expected_message: Option<String>,
    /// Require the message to match exactly instead of by similarity.
    pub exact_message: bool,
}

impl DeathExpectation {
    /// Accepts any abnormal termination.
    pub fn any() -> Self {
        Self {
            expected_signal: None,
            expected_exit_code: None,
            min_similarity: DEFAULT_MIN_SIMILARITY,
            expected_message: None,
            exact_message: false,
        }
    }

    /// Requires termination by the given signal.
    pub fn signal(signal: i32) -> Self {
        Self {
            expected_signal: Some(signal),
            ..Self::any()
        }
    }

    /// Requires a normal exit with the given (non-zero) code.
    pub fn exit_code(code: i32) -> Self {
        Self {
            expected_exit_code: Some(code),
            ..Self::any()
        }
    }

    /// Additionally requires the custom assertion message, matched by
    /// similarity against [`min_similarity`](Self::min_similarity).
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.expected_message = Some(message.into());
        self
    }

    /// Additionally requires the custom assertion message to match exactly.
    pub fn with_exact_message(mut self, message: impl Into<String>) -> Self {
        self.expected_message = Some(message.into());
        self.exact_message = true;
        self
    }

    /// Overrides the minimum similarity ratio.
    pub fn with_min_similarity(mut self, ratio: f64) -> Self {
        self.min_similarity = ratio;
        self
    }
}

/// A registered test descriptor.
#[derive(Debug, Clone)]
pub struct TestCase {
    /// Suite name; identifier-like by convention.
    pub suite: String,
    /// Free-form test name.
    pub name: String,
    /// The test body.
    pub func: TestFn,
    /// Expected abnormal termination, when this is a death test.
    pub death: Option<DeathExpectation>,
    /// Per-test timeout in milliseconds; 0 means "use the run default".
    pub timeout_ms: u64,
    /// Whether the end-of-test leak check starts enabled.
    pub leak_check: bool,
}

impl TestCase {
    pub fn new(suite: impl Into<String>, name: impl Into<String>, func: TestFn) -> Self {
        Self {
            suite: suite.into(),
            name: name.into(),
            func,
            death: None,
            timeout_ms: 0,
            leak_check: true,
        }
    }

    /// Turns this test into a death test.
    pub fn with_death(mut self, expectation: DeathExpectation) -> Self {
        self.death = Some(expectation);
        self
    }

    /// Overrides the run-wide timeout for this test.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Starts the test with the leak check disabled.
    pub fn without_leak_check(mut self) -> Self {
        self.leak_check = false;
        self
    }
}

/// A contiguous group of tests sharing a suite name.
#[derive(Debug, Clone, Copy)]
pub struct SuiteGroup<'a> {
    pub name: &'a str,
    pub cases: &'a [TestCase],
}

/// Listing entry for `--list_tests`.
#[derive(Debug, Serialize)]
pub struct ListEntry<'a> {
    pub suite: &'a str,
    pub name: &'a str,
    pub timeout_ms: u64,
    pub death_test: bool,
}

/// The ordered collection of all declared tests.
///
/// Immutable once the runner starts; the runner only enumerates and scans.
#[derive(Debug, Default)]
pub struct Registry {
    cases: Vec<TestCase>,
}

impl Registry {
    pub fn new() -> Self {
        Self { cases: Vec::new() }
    }

    /// Appends a descriptor. Declaration order is preserved.
    pub fn declare(&mut self, case: TestCase) {
        self.cases.push(case);
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Descriptors in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &TestCase> {
        self.cases.iter()
    }

    /// Linear scan by (suite, test); the only lookup the harness needs.
    pub fn find(&self, suite: &str, name: &str) -> Option<&TestCase> {
        self.cases
            .iter()
            .find(|case| case.suite == suite && case.name == name)
    }

    /// Groups consecutive descriptors with equal suite names.
    ///
    /// Two runs of the same suite name separated by another suite stay
    /// separate groups, matching declaration order exactly.
    pub fn suites(&self) -> Vec<SuiteGroup<'_>> {
        let mut groups = Vec::new();
        let mut start = 0;
        for i in 1..=self.cases.len() {
            if i == self.cases.len() || self.cases[i].suite != self.cases[start].suite {
                groups.push(SuiteGroup {
                    name: &self.cases[start].suite,
                    cases: &self.cases[start..i],
                });
                start = i;
            }
        }
        groups
    }

    /// Listing entries in declaration order.
    pub fn entries(&self) -> Vec<ListEntry<'_>> {
        self.cases
            .iter()
            .map(|case| ListEntry {
                suite: &case.suite,
                name: &case.name,
                timeout_ms: case.timeout_ms,
                death_test: case.death.is_some(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nop() {}

    fn registry_of(pairs: &[(&str, &str)]) -> Registry {
        let mut registry = Registry::new();
        for (suite, name) in pairs {
            registry.declare(TestCase::new(*suite, *name, nop));
        }
        registry
    }

    #[test]
    fn enumeration_preserves_declaration_order() {
        let registry = registry_of(&[("A", "one"), ("A", "two"), ("B", "three"), ("A", "four")]);
        let names: Vec<_> = registry.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["one", "two", "three", "four"]);
    }

    #[test]
    fn consecutive_suites_group_without_reordering() {
        let registry = registry_of(&[("A", "one"), ("A", "two"), ("B", "three"), ("A", "four")]);
        let groups = registry.suites();
        let shape: Vec<_> = groups.iter().map(|g| (g.name, g.cases.len())).collect();
        // The second run of "A" stays a separate suite.
        assert_eq!(shape, [("A", 2), ("B", 1), ("A", 1)]);
    }

    #[test]
    fn find_is_keyed_on_suite_and_name() {
        let registry = registry_of(&[("A", "one"), ("B", "one")]);
        assert!(registry.find("A", "one").is_some());
        assert!(registry.find("B", "one").is_some());
        assert!(registry.find("C", "one").is_none());
        assert!(registry.find("A", "two").is_none());
    }

    #[test]
    fn death_expectation_builders() {
        let plain = DeathExpectation::any();
        assert_eq!(plain.expected_signal, None);
        assert_eq!(plain.expected_exit_code, None);
        assert!((plain.min_similarity - DEFAULT_MIN_SIMILARITY).abs() < f64::EPSILON);

        let exact = DeathExpectation::signal(6).with_exact_message("boom");
        assert!(exact.exact_message);
        assert_eq!(exact.expected_message.as_deref(), Some("boom"));

        let loose = DeathExpectation::exit_code(3)
            .with_message("roughly this")
            .with_min_similarity(0.5);
        assert!(!loose.exact_message);
        assert!((loose.min_similarity - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn listing_reflects_descriptor_metadata() {
        let mut registry = Registry::new();
        registry.declare(TestCase::new("A", "plain", nop));
        registry.declare(
            TestCase::new("A", "deadly", nop)
                .with_death(DeathExpectation::any())
                .with_timeout_ms(250),
        );
        let entries = registry.entries();
        assert_eq!(entries.len(), 2);
        assert!(!entries[0].death_test);
        assert!(entries[1].death_test);
        assert_eq!(entries[1].timeout_ms, 250);
    }
}
