//! cordon-selftest: the harness exercising itself.
//!
//! Registers a mix of well-behaved suites and deliberately misbehaving
//! demo suites (leaks, timeouts, death-expectation mismatches). The
//! integration tests drive this binary suite by suite; running it with no
//! arguments therefore exits non-zero by design.

use std::process::ExitCode;
use std::time::Duration;

use cordon::platform::{EXIT_REALLOC_UNTRACKED, EXIT_RELEASE_UNTRACKED};
#[cfg(unix)]
use cordon::platform::{SIGABRT, SIGSEGV};
use cordon::{DeathExpectation, Registry, TestCase, heap};

fn adds_small_numbers() {
    cordon::check_eq!(4, 2 + 2);
    cordon::check!(1 + 1 == 2);
}

fn multiplies_without_surprises() {
    cordon::check_eq!(42, 6 * 7);
    cordon::check_ne!(42, 6 * 6);
    cordon::refute!(6 * 7 == 43);
}

fn integer_division_truncates() {
    cordon::check_eq!(3, 7 / 2);
    cordon::check_eq!(0, 1 / 2);
}

fn allocates_and_releases_in_pairs() {
    let blocks: Vec<_> = (1..=4usize).map(|i| heap::alloc(i * 8)).collect();
    cordon::check_eq!(4, heap::alloc_count());
    cordon::check_eq!(0, heap::free_count());

    for block in blocks {
        heap::release(block);
    }
    cordon::check_eq!(heap::alloc_count(), heap::free_count());
    cordon::check_eq!(heap::bytes_allocated(), heap::bytes_freed());
}

fn resize_accounting_is_split() {
    let block = heap::alloc(100);
    let block = heap::realloc(block, 250);
    cordon::check_eq!(250, heap::bytes_allocated());
    cordon::check_eq!(0, heap::bytes_freed());

    let block = heap::realloc(block, 40);
    cordon::check_eq!(250, heap::bytes_allocated());
    cordon::check_eq!(210, heap::bytes_freed());

    heap::release(block);
    cordon::check_eq!(250, heap::bytes_freed());
}

fn baseline_exempts_fixture_blocks() {
    // Fixture allocations a test legitimately never releases.
    let _fixture_a = heap::alloc(32);
    let _fixture_b = heap::alloc(32);
    heap::mark_baseline();

    let scratch: Vec<_> = (0..3).map(|_| heap::alloc(8)).collect();
    for block in scratch {
        heap::release(block);
    }
    // Leak check stays enabled; the baselined fixtures must not trip it.
}

fn zeroed_allocation_really_is_zero() {
    let block = heap::zalloc(8, 4);
    for offset in 0..32 {
        cordon::check_eq!(0, unsafe { block.add(offset).read() });
    }
    heap::release(block);
}

fn paused_tracking_is_invisible() {
    heap::set_tracking_active(false);
    let quiet = heap::alloc(64);
    heap::release(quiet);
    heap::set_tracking_active(true);
    cordon::check_eq!(0, heap::alloc_count());
    cordon::check_eq!(0, heap::free_count());
}

fn prints_a_greeting() {
    cordon::check_stdout_eq!(cordon::coutln!("hello"), "hello\n");
}

fn whitespace_differences_are_forgiven() {
    cordon::check_stdout_eq_normalized!(cordon::cout!("a   b\t c"), "a b c");
}

fn near_matches_pass_by_similarity() {
    cordon::check_stdout_similar!(cordon::cout!("the quick brown fox"), "the quick brown fax", 0.9);
}

#[cfg(unix)]
fn writes_through_a_null_pointer() {
    unsafe { std::ptr::null_mut::<u8>().write_volatile(1) };
}

#[cfg(unix)]
fn aborts_with_a_custom_message() {
    cordon::fatal_assert!(1 == 2, "arithmetic is broken");
}

fn exits_with_a_chosen_code() {
    std::process::exit(3);
}

fn double_release_is_trapped() {
    let block = heap::alloc(16);
    heap::release(block);
    heap::release(block);
}

fn foreign_resize_is_trapped() {
    // Never dereferenced: the tracker rejects the address first.
    let bogus = 0x1000 as *mut u8;
    let _ = heap::realloc(bogus, 64);
}

fn reports_a_failed_comparison() {
    cordon::check_eq!(4, 5);
}

fn leaks_one_hundred_bytes() {
    let _lost = heap::alloc(100);
}

fn expects_different_casing() {
    cordon::check_stdout_eq!(cordon::coutln!("hello"), "Hello\n");
}

fn sleeps_past_its_budget() {
    std::thread::sleep(Duration::from_secs(30));
}

fn aborts_with_the_wrong_message() {
    cordon::fatal_assert!(1 == 2, "expected custom message");
}

fn main() -> ExitCode {
    let mut registry = Registry::new();

    registry.declare(TestCase::new("Arithmetic", "adds small numbers", adds_small_numbers));
    registry.declare(TestCase::new(
        "Arithmetic",
        "multiplies without surprises",
        multiplies_without_surprises,
    ));
    registry.declare(TestCase::new(
        "Arithmetic",
        "integer division truncates",
        integer_division_truncates,
    ));

    registry.declare(TestCase::new(
        "Heap",
        "allocates and releases in pairs",
        allocates_and_releases_in_pairs,
    ));
    registry.declare(TestCase::new("Heap", "resize accounting is split", resize_accounting_is_split));
    registry.declare(TestCase::new(
        "Heap",
        "baseline exempts fixture blocks",
        baseline_exempts_fixture_blocks,
    ));
    registry.declare(TestCase::new(
        "Heap",
        "zeroed allocation really is zero",
        zeroed_allocation_really_is_zero,
    ));
    registry.declare(TestCase::new(
        "Heap",
        "paused tracking is invisible",
        paused_tracking_is_invisible,
    ));

    registry.declare(TestCase::new("Stdout", "prints a greeting", prints_a_greeting));
    registry.declare(TestCase::new(
        "Stdout",
        "whitespace differences are forgiven",
        whitespace_differences_are_forgiven,
    ));
    registry.declare(TestCase::new(
        "Stdout",
        "near matches pass by similarity",
        near_matches_pass_by_similarity,
    ));

    #[cfg(unix)]
    {
        registry.declare(
            TestCase::new("Death", "writes through a null pointer", writes_through_a_null_pointer)
                .with_death(DeathExpectation::signal(SIGSEGV)),
        );
        registry.declare(
            TestCase::new("Death", "aborts with a custom message", aborts_with_a_custom_message)
                .with_death(
                    DeathExpectation::signal(SIGABRT).with_message("arithmetic is broken"),
                ),
        );
    }
    registry.declare(
        TestCase::new("Death", "exits with a chosen code", exits_with_a_chosen_code)
            .with_death(DeathExpectation::exit_code(3)),
    );
    registry.declare(
        TestCase::new("Death", "double release is trapped", double_release_is_trapped)
            .with_death(DeathExpectation::exit_code(EXIT_RELEASE_UNTRACKED)),
    );
    registry.declare(
        TestCase::new("Death", "foreign resize is trapped", foreign_resize_is_trapped)
            .with_death(DeathExpectation::exit_code(EXIT_REALLOC_UNTRACKED)),
    );

    // Deliberately misbehaving suites, driven by the integration tests.
    registry.declare(TestCase::new(
        "FailDemo",
        "reports a failed comparison",
        reports_a_failed_comparison,
    ));
    registry.declare(TestCase::new("LeakDemo", "leaks one hundred bytes", leaks_one_hundred_bytes));
    registry.declare(TestCase::new(
        "StdoutMismatch",
        "expects different casing",
        expects_different_casing,
    ));
    registry.declare(
        TestCase::new("TimeoutDemo", "sleeps past its budget", sleeps_past_its_budget)
            .with_timeout_ms(500),
    );
    registry.declare(
        TestCase::new(
            "DeathMismatch",
            "aborts with the wrong message",
            aborts_with_the_wrong_message,
        )
        .with_death(DeathExpectation::any().with_exact_message("other message")),
    );

    cordon::run(registry)
}
