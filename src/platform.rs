//! Platform facilities: terminal color negotiation, CI detection, and
//! interpretation of child process termination.
//!
//! The harness relies on the child's exit disposition to tell ordinary
//! failures apart from framework-fatal conditions, so the well-known exit
//! codes live here alongside the code that decodes an [`std::process::ExitStatus`]
//! into an [`ExitDisposition`].

use std::process::ExitStatus;

use crate::config::ColorChoice;

/// Framework-fatal: resize of an invalid or untracked pointer (child only).
pub const EXIT_REALLOC_UNTRACKED: i32 = 120;

/// Framework-fatal: release of NULL under strict tracking.
///
/// Reserved. Releasing NULL is a silent no-op in this implementation, so the
/// code is never emitted, but the value stays claimed so the crash table is
/// stable across versions.
pub const EXIT_RELEASE_NULL: i32 = 121;

/// Framework-fatal: invalid or double release (child only).
pub const EXIT_RELEASE_UNTRACKED: i32 = 122;

/// The child could not exec itself.
pub const EXIT_EXEC_FAILED: i32 = 127;

/// Fatal allocation failure inside the harness itself.
pub const EXIT_ALLOC_FAILED: i32 = 250;

/// Child-mode argument count mismatch.
pub const EXIT_CHILD_USAGE: i32 = 255;

// Signal numbers shared by the platforms the harness supports. Defined
// unconditionally so death expectations stay spellable in cross-platform
// test sources; they only ever match on Unix.
pub const SIGILL: i32 = 4;
pub const SIGABRT: i32 = 6;
pub const SIGFPE: i32 = 8;
pub const SIGKILL: i32 = 9;
pub const SIGSEGV: i32 = 11;

/// Human-readable name for the signals the harness knows about.
pub fn signal_name(signal: i32) -> &'static str {
    match signal {
        SIGILL => "SIGILL",
        SIGABRT => "SIGABRT",
        SIGFPE => "SIGFPE",
        SIGKILL => "SIGKILL",
        SIGSEGV => "SIGSEGV",
        _ => "unknown signal",
    }
}

/// How a child process came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDisposition {
    /// The process exited with the given code.
    Exited(i32),
    /// The process was terminated by the given signal (Unix only).
    Signaled(i32),
}

/// Decodes an [`ExitStatus`] into an [`ExitDisposition`].
///
/// On Unix a signal termination is reported as [`ExitDisposition::Signaled`];
/// everywhere else, and for normal exits, the exit code is used. A status
/// with neither (theoretically possible on exotic wait results) maps to
/// `Exited(-1)`.
pub fn disposition(status: &ExitStatus) -> ExitDisposition {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return ExitDisposition::Signaled(signal);
        }
    }
    ExitDisposition::Exited(status.code().unwrap_or(-1))
}

/// Diagnostic text for exit codes in the framework-fatal range.
///
/// Returns `None` for codes outside the range; the caller falls back to a
/// generic "exited with code N" message.
pub fn crash_reason(code: i32) -> Option<String> {
    match code {
        EXIT_REALLOC_UNTRACKED => {
            Some("Framework-fatal: resize of an invalid or untracked pointer.".to_string())
        }
        EXIT_RELEASE_NULL => {
            Some("Framework-fatal: release of NULL under strict tracking.".to_string())
        }
        EXIT_RELEASE_UNTRACKED => {
            Some("Framework-fatal: invalid or double release of a pointer.".to_string())
        }
        EXIT_EXEC_FAILED => Some("Child process could not exec itself.".to_string()),
        EXIT_ALLOC_FAILED => {
            Some("Fatal allocation failure inside the test harness.".to_string())
        }
        EXIT_CHILD_USAGE => Some("Child-mode argument count mismatch.".to_string()),
        _ => None,
    }
}

/// Negotiates the global color mode for console output.
///
/// `Auto` enables color only when stdout is a terminal and `NO_COLOR` is not
/// present in the environment. The `console` crate takes care of enabling
/// virtual-terminal processing on Windows when colors are on.
pub fn init_colors(choice: ColorChoice) {
    let enabled = match choice {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => {
            console::Term::stdout().features().colors_supported()
                && std::env::var_os("NO_COLOR").is_none()
        }
    };
    console::set_colors_enabled(enabled);
}

/// True when the `CI` environment variable is present.
pub fn ci_enabled() -> bool {
    std::env::var_os("CI").is_some()
}
