//! Tracked heap: the allocation wrappers, usage counters, misuse traps, and
//! the end-of-test leak check.
//!
//! Code under test allocates through the four wrappers ([`alloc`],
//! [`zalloc`], [`realloc`], [`release`]) instead of the raw system
//! allocator. Every wrapper captures its call site via `#[track_caller]`,
//! and every block carries a small header storing its size, so release and
//! resize work identically whether tracking is on or off.
//!
//! Two switches govern recording: `enabled` is set once per test at child
//! entry, `active` can be toggled around regions that should not be
//! tracked ([`set_tracking_active`]). When either is off the wrappers are
//! plain passthrough.
//!
//! Misuse while tracking is on is fatal to the child: resizing an untracked
//! pointer exits with [`crate::platform::EXIT_REALLOC_UNTRACKED`], releasing
//! one exits with [`crate::platform::EXIT_RELEASE_UNTRACKED`]. Releasing
//! NULL is a silent no-op, matching the system allocator. Pointers that did
//! not come from these wrappers must never be passed to [`release`] or
//! [`realloc`] while tracking is off; there is no header to consult.
//!
//! The tracker's own bookkeeping lives in ordinary Rust collections that
//! never route through the wrappers, so tracking is self-exclusive by
//! construction.

use std::alloc::Layout;
use std::panic::Location;
use std::sync::{Mutex, MutexGuard};

use crate::platform::{EXIT_ALLOC_FAILED, EXIT_REALLOC_UNTRACKED, EXIT_RELEASE_UNTRACKED};
use crate::result::AssertionFailure;

/// Per-block header: holds the payload size, keeps the payload 16-aligned.
const HEADER: usize = 16;

/// One live tracked allocation.
#[derive(Debug, Clone)]
struct AllocationRecord {
    address: usize,
    size: usize,
    file: &'static str,
    line: u32,
    baseline: bool,
}

#[derive(Debug)]
struct HeapState {
    records: Vec<AllocationRecord>,
    enabled: bool,
    active: bool,
    leak_check: bool,
    alloc_count: u64,
    free_count: u64,
    bytes_allocated: u64,
    bytes_freed: u64,
}

impl HeapState {
    const fn new() -> Self {
        Self {
            records: Vec::new(),
            enabled: false,
            active: true,
            leak_check: true,
            alloc_count: 0,
            free_count: 0,
            bytes_allocated: 0,
            bytes_freed: 0,
        }
    }

    fn tracking(&self) -> bool {
        self.enabled && self.active
    }
}

static STATE: Mutex<HeapState> = Mutex::new(HeapState::new());

fn state() -> MutexGuard<'static, HeapState> {
    STATE.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn die(code: i32, message: String) -> ! {
    eprintln!("{message}");
    std::process::exit(code);
}

fn block_layout(size: usize) -> Layout {
    let total = match size.checked_add(HEADER) {
        Some(total) => total,
        None => die(
            EXIT_ALLOC_FAILED,
            format!("Framework-fatal: allocation size overflow ({size} bytes)."),
        ),
    };
    match Layout::from_size_align(total, HEADER) {
        Ok(layout) => layout,
        Err(_) => die(
            EXIT_ALLOC_FAILED,
            format!("Framework-fatal: invalid allocation layout for {size} bytes."),
        ),
    }
}

/// Resets the tracker at child-mode entry: clears the record list, zeroes
/// the counters, and turns both switches on.
pub fn init_for_test(leak_check: bool) {
    let mut st = state();
    st.records.clear();
    st.enabled = true;
    st.active = true;
    st.leak_check = leak_check;
    st.alloc_count = 0;
    st.free_count = 0;
    st.bytes_allocated = 0;
    st.bytes_freed = 0;
}

/// The per-test switch. The runner sets it at test entry; user code should
/// normally use [`set_tracking_active`] instead.
pub fn set_tracking_enabled(on: bool) {
    state().enabled = on;
}

/// Pauses or resumes tracking around regions whose allocations should not
/// be recorded.
pub fn set_tracking_active(on: bool) {
    state().active = on;
}

/// Suppresses the end-of-test leak check for the current test.
pub fn disable_leak_check() {
    state().leak_check = false;
}

/// Flags every currently live record as baseline. Baselined blocks are
/// ignored by the leak check but remain tracked, so releasing them later
/// still succeeds and still counts.
pub fn mark_baseline() {
    for record in &mut state().records {
        record.baseline = true;
    }
}

/// Cumulative successful allocations for the current test.
pub fn alloc_count() -> u64 {
    state().alloc_count
}

/// Cumulative successful releases for the current test.
pub fn free_count() -> u64 {
    state().free_count
}

/// Cumulative bytes handed out, including the growth side of resizes.
pub fn bytes_allocated() -> u64 {
    state().bytes_allocated
}

/// Cumulative bytes returned, including the shrink side of resizes.
pub fn bytes_freed() -> u64 {
    state().bytes_freed
}

/// Sum of the sizes of all live tracked records.
pub fn live_bytes() -> u64 {
    state().records.iter().map(|r| r.size as u64).sum()
}

/// Allocates `size` bytes, recording the call site when tracking is on.
#[track_caller]
pub fn alloc(size: usize) -> *mut u8 {
    let loc = Location::caller();
    raw_alloc(size, false, loc.file(), loc.line())
}

/// Allocates `count * size` zeroed bytes.
#[track_caller]
pub fn zalloc(count: usize, size: usize) -> *mut u8 {
    let loc = Location::caller();
    let total = match count.checked_mul(size) {
        Some(total) => total,
        None => die(
            EXIT_ALLOC_FAILED,
            format!("Framework-fatal: zeroed allocation overflow ({count} x {size})."),
        ),
    };
    raw_alloc(total, true, loc.file(), loc.line())
}

fn raw_alloc(size: usize, zero: bool, file: &'static str, line: u32) -> *mut u8 {
    let layout = block_layout(size);
    let base = unsafe {
        if zero {
            std::alloc::alloc_zeroed(layout)
        } else {
            std::alloc::alloc(layout)
        }
    };
    if base.is_null() {
        die(
            EXIT_ALLOC_FAILED,
            format!("Framework-fatal: allocation of {size} bytes failed at {file}:{line}."),
        );
    }
    // SAFETY: base points to at least HEADER bytes, aligned for usize.
    unsafe { (base as *mut usize).write(size) };
    let ptr = unsafe { base.add(HEADER) };

    let mut st = state();
    if st.tracking() {
        st.records.push(AllocationRecord {
            address: ptr as usize,
            size,
            file,
            line,
            baseline: false,
        });
        st.alloc_count += 1;
        st.bytes_allocated += size as u64;
    }
    ptr
}

/// Reads the payload size stored in a block's header.
///
/// # Safety
/// `ptr` must have been returned by one of the wrappers and not yet
/// released.
unsafe fn stored_size(ptr: *mut u8) -> usize {
    unsafe { (ptr.sub(HEADER) as *const usize).read() }
}

/// Resizes a wrapper-allocated block.
///
/// NULL behaves as a fresh allocation and size 0 as a release. Resizing an
/// address the tracker does not know, while tracking is on, is fatal.
#[track_caller]
pub fn realloc(ptr: *mut u8, new_size: usize) -> *mut u8 {
    let loc = Location::caller();
    if ptr.is_null() {
        return raw_alloc(new_size, false, loc.file(), loc.line());
    }
    if new_size == 0 {
        raw_release(ptr, loc.file(), loc.line());
        return std::ptr::null_mut();
    }

    {
        let st = state();
        if st.tracking() && !st.records.iter().any(|r| r.address == ptr as usize) {
            die(
                EXIT_REALLOC_UNTRACKED,
                format!(
                    "Framework-fatal: resize of invalid pointer {ptr:p} at {}:{}.",
                    loc.file(),
                    loc.line()
                ),
            );
        }
    }

    let old_size = unsafe { stored_size(ptr) };
    let new_layout_size = match new_size.checked_add(HEADER) {
        Some(total) => total,
        None => die(
            EXIT_ALLOC_FAILED,
            format!("Framework-fatal: allocation size overflow ({new_size} bytes)."),
        ),
    };
    let new_base = unsafe {
        std::alloc::realloc(ptr.sub(HEADER), block_layout(old_size), new_layout_size)
    };
    if new_base.is_null() {
        die(
            EXIT_ALLOC_FAILED,
            format!(
                "Framework-fatal: resize to {new_size} bytes failed at {}:{}.",
                loc.file(),
                loc.line()
            ),
        );
    }
    unsafe { (new_base as *mut usize).write(new_size) };
    let new_ptr = unsafe { new_base.add(HEADER) };

    let mut st = state();
    if st.tracking() {
        if let Some(record) = st
            .records
            .iter_mut()
            .find(|r| r.address == ptr as usize)
        {
            record.address = new_ptr as usize;
            record.size = new_size;
            record.file = loc.file();
            record.line = loc.line();
        }
        if new_size > old_size {
            st.bytes_allocated += (new_size - old_size) as u64;
        } else {
            st.bytes_freed += (old_size - new_size) as u64;
        }
    }
    new_ptr
}

/// Releases a wrapper-allocated block.
///
/// Releasing NULL is a silent no-op. Releasing an address the tracker does
/// not know, while tracking is on, is fatal.
#[track_caller]
pub fn release(ptr: *mut u8) {
    if ptr.is_null() {
        return;
    }
    let loc = Location::caller();
    raw_release(ptr, loc.file(), loc.line());
}

fn raw_release(ptr: *mut u8, file: &str, line: u32) {
    {
        let mut st = state();
        if st.tracking() {
            match st.records.iter().position(|r| r.address == ptr as usize) {
                Some(index) => {
                    let record = st.records.remove(index);
                    st.free_count += 1;
                    st.bytes_freed += record.size as u64;
                }
                None => die(
                    EXIT_RELEASE_UNTRACKED,
                    format!(
                        "Framework-fatal: invalid or double release of pointer {ptr:p} at {file}:{line}."
                    ),
                ),
            }
        }
    }
    let size = unsafe { stored_size(ptr) };
    unsafe { std::alloc::dealloc(ptr.sub(HEADER), block_layout(size)) };
}

/// End-of-test leak scan.
///
/// Returns a single synthesized failure summarizing every live non-baseline
/// record, or `None` when the check is disabled, tracking is off, or
/// nothing leaked. Tracking is switched off as a side effect, mirroring the
/// child's teardown order.
pub(crate) fn leak_report() -> Option<AssertionFailure> {
    let mut st = state();
    if !st.leak_check || !st.enabled {
        return None;
    }
    st.enabled = false;
    let leaks: Vec<&AllocationRecord> = st.records.iter().filter(|r| !r.baseline).collect();
    let first = leaks.first()?;

    let mut actual = format!("{} leaked block(s):", leaks.len());
    for leak in &leaks {
        actual.push_str(&format!(
            "\n      - {} bytes allocated at {}:{}",
            leak.size, leak.file, leak.line
        ));
    }
    Some(AssertionFailure {
        file: first.file.to_string(),
        line: first.line,
        condition: "No memory leaks".to_string(),
        expected: "all tracked allocations released".to_string(),
        actual,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // The tracker is process-global; tests that touch it take this lock so
    // the default multi-threaded test runner cannot interleave them.
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    fn exclusive() -> MutexGuard<'static, ()> {
        TEST_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[test]
    fn paired_allocations_leave_no_leak() {
        let _guard = exclusive();
        init_for_test(true);

        let mut blocks = Vec::new();
        for i in 1..=5usize {
            blocks.push((alloc(i * 8), i * 8));
        }
        assert_eq!(alloc_count(), 5);
        assert_eq!(bytes_allocated(), 8 + 16 + 24 + 32 + 40);
        assert_eq!(live_bytes(), bytes_allocated() - bytes_freed());

        for (ptr, _) in blocks {
            release(ptr);
        }
        assert_eq!(free_count(), 5);
        assert_eq!(bytes_freed(), bytes_allocated());
        assert_eq!(live_bytes(), 0);
        assert!(leak_report().is_none());
    }

    #[test]
    fn live_bytes_matches_the_counter_delta_at_every_step() {
        let _guard = exclusive();
        init_for_test(true);

        let a = alloc(100);
        assert_eq!(live_bytes(), bytes_allocated() - bytes_freed());
        let b = alloc(50);
        assert_eq!(live_bytes(), bytes_allocated() - bytes_freed());
        release(a);
        assert_eq!(live_bytes(), bytes_allocated() - bytes_freed());
        let c = realloc(b, 200);
        assert_eq!(live_bytes(), bytes_allocated() - bytes_freed());
        release(c);
        assert_eq!(live_bytes(), 0);
    }

    #[test]
    fn leak_report_names_every_unfreed_block() {
        let _guard = exclusive();
        init_for_test(true);

        let _leaked = alloc(100);
        let kept = alloc(24);
        let report = leak_report().expect("two live blocks must report");
        assert_eq!(report.condition, "No memory leaks");
        assert!(report.actual.contains("2 leaked block(s)"));
        assert!(report.actual.contains("100 bytes allocated at"));
        assert!(report.actual.contains("24 bytes allocated at"));
        assert!(report.actual.contains("heap.rs"));

        // Tracking was switched off by the scan; clean up quietly.
        release(kept);
    }

    #[test]
    fn disabled_leak_check_reports_nothing() {
        let _guard = exclusive();
        init_for_test(true);
        let p = alloc(64);
        disable_leak_check();
        assert!(leak_report().is_none());
        release(p);
    }

    #[test]
    fn baseline_blocks_are_exempt_but_still_releasable() {
        let _guard = exclusive();
        init_for_test(true);

        let setup: Vec<_> = (0..3).map(|_| alloc(16)).collect();
        mark_baseline();

        let scratch: Vec<_> = (0..4).map(|_| alloc(8)).collect();
        for ptr in scratch {
            release(ptr);
        }
        // Releasing a baselined block still goes through the tracker.
        let frees_before = free_count();
        release(setup[0]);
        assert_eq!(free_count(), frees_before + 1);

        assert!(leak_report().is_none());

        // Scan disabled tracking; the remaining setup blocks just leak here.
        let _ = &setup[1..];
    }

    #[test]
    fn resize_accounting_splits_growth_and_shrink() {
        let _guard = exclusive();
        init_for_test(true);

        let p = alloc(100);
        let allocated = bytes_allocated();
        let freed = bytes_freed();

        let p = realloc(p, 250);
        assert_eq!(bytes_allocated(), allocated + 150);
        assert_eq!(bytes_freed(), freed);

        let p = realloc(p, 40);
        assert_eq!(bytes_allocated(), allocated + 150);
        assert_eq!(bytes_freed(), freed + 210);
        assert_eq!(live_bytes(), 40);

        release(p);
        assert_eq!(live_bytes(), 0);
    }

    #[test]
    fn resize_of_null_allocates_and_resize_to_zero_releases() {
        let _guard = exclusive();
        init_for_test(true);

        let p = realloc(std::ptr::null_mut(), 32);
        assert!(!p.is_null());
        assert_eq!(alloc_count(), 1);

        let q = realloc(p, 0);
        assert!(q.is_null());
        assert_eq!(free_count(), 1);
        assert_eq!(live_bytes(), 0);
    }

    #[test]
    fn release_of_null_is_a_no_op() {
        let _guard = exclusive();
        init_for_test(true);
        release(std::ptr::null_mut());
        assert_eq!(free_count(), 0);
    }

    #[test]
    fn inactive_tracking_is_passthrough() {
        let _guard = exclusive();
        init_for_test(true);

        set_tracking_active(false);
        let p = alloc(128);
        assert_eq!(alloc_count(), 0);
        assert_eq!(live_bytes(), 0);
        release(p);
        assert_eq!(free_count(), 0);
        set_tracking_active(true);

        assert!(leak_report().is_none());
    }

    #[test]
    fn zeroed_allocation_is_tracked_with_the_full_extent() {
        let _guard = exclusive();
        init_for_test(true);

        let p = zalloc(4, 16);
        assert_eq!(bytes_allocated(), 64);
        // All 64 bytes really are zero.
        for i in 0..64 {
            assert_eq!(unsafe { p.add(i).read() }, 0);
        }
        release(p);
        assert!(leak_report().is_none());
    }
}
