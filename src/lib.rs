//! # cordon
//!
//! A self-contained unit-test harness for low-level code. Every test runs
//! in an isolated child process that the parent supervises for abnormal
//! termination, timeouts, and captured output; each child carries its own
//! tracked heap for per-test allocation accounting and leak detection.
//!
//! ## Overview
//!
//! Cordon provides:
//!
//! - **Process isolation**: one supervised child per test, nothing shared
//! - **Tracked heap**: allocation/free counters, byte totals, leak checks
//!   with a baseline mechanism, and fatal traps for invalid use
//! - **Death tests**: expect a specific signal, exit code, or fatal
//!   assertion message (matched exactly or by Levenshtein similarity)
//! - **Stdout assertions**: exact, whitespace-normalized, or
//!   similarity-based comparison of captured output
//! - **Pluggable reporting**: a colorized console reporter with an optional
//!   machine-readable CI summary, behind an async [`Reporter`] trait
//!
//! ## Architecture
//!
//! The crate is organized around the parent/child split:
//!
//! ### Declaration ([`registry`])
//!
//! Tests are declared explicitly into a [`Registry`]; declaration order is
//! execution order, and consecutive descriptors sharing a suite name form
//! a suite.
//!
//! ### The child ([`heap`], [`record`], [`codec`])
//!
//! In child mode the runner initializes the tracked heap, installs the
//! in-flight result, runs exactly one test body, runs the leak check, and
//! serializes the result to stdout as a control-character-framed record
//! stream.
//!
//! ### The parent ([`supervisor`], [`death`], [`report`], [`runner`])
//!
//! In parent mode the runner spawns one child per test with a combined
//! stdout/stderr capture, enforces the per-test timeout, classifies the
//! termination (parsing the frame, or applying the death expectation), and
//! feeds each result to the reporter before dropping it.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::process::ExitCode;
//!
//! use cordon::{DeathExpectation, Registry, TestCase};
//!
//! fn adds_small_numbers() {
//!     cordon::check_eq!(4, 2 + 2);
//! }
//!
//! fn releases_what_it_takes() {
//!     let block = cordon::heap::alloc(64);
//!     cordon::heap::release(block);
//!     cordon::check_eq!(cordon::heap::alloc_count(), cordon::heap::free_count());
//! }
//!
//! fn rejects_null_input() {
//!     cordon::fatal_assert!(false, "input must not be null");
//! }
//!
//! fn main() -> ExitCode {
//!     let mut registry = Registry::new();
//!     registry.declare(TestCase::new("Arithmetic", "adds small numbers", adds_small_numbers));
//!     registry.declare(TestCase::new("Heap", "releases what it takes", releases_what_it_takes));
//!     registry.declare(
//!         TestCase::new("Guards", "rejects null input", rejects_null_input)
//!             .with_death(
//!                 DeathExpectation::signal(cordon::platform::SIGABRT)
//!                     .with_message("input must not be null"),
//!             ),
//!     );
//!     cordon::run(registry)
//! }
//! ```
//!
//! ## Invocation surface
//!
//! The binary produced above understands the engine flags `--suite=<name>`,
//! `--default_timeout_ms=<ms>`, `--list_tests[=<format>]`, `--config=<path>`
//! and `--verbose`, plus the internal child-mode marker
//! `--run_test <suite> <test>`. `NO_COLOR` disables color, `CI` enables the
//! machine-readable summary block. Exit code 0 means every test passed.
//!
//! ## Configuration
//!
//! An optional `cordon.toml` supplies run-wide defaults; see [`config`].

pub mod codec;
pub mod config;
pub mod death;
pub mod heap;
pub mod platform;
pub mod record;
pub mod registry;
pub mod report;
pub mod result;
pub mod runner;
pub mod supervisor;

// Re-export the types a test binary needs to declare and run tests.

pub use config::{Config, load_config, load_config_str};
pub use registry::{DeathExpectation, Registry, TestCase};
pub use report::{ConsoleReporter, MultiReporter, NullReporter, Reporter};
pub use result::{AssertionFailure, RunResult, SuiteResult, TestResult, TestStatus};
pub use runner::{run, run_with_args};
