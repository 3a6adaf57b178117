//! Diagnostic blocks describing process outcomes.

use std::fmt::Write as _;

use crate::{ExitOutcome, ProcessHandle};

/// Header preceding captured stdout.
pub const STDOUT_HEADER: &str = "⬇⬇⬇ STANDARD OUTPUT ⬇⬇⬇";
/// Footer following captured stdout.
pub const STDOUT_FOOTER: &str = "⬆⬆⬆ STANDARD OUTPUT ⬆⬆⬆";
/// Header preceding captured stderr.
pub const STDERR_HEADER: &str = "▼▼▼ ERROR OUTPUT ▼▼▼";
/// Footer following captured stderr.
pub const STDERR_FOOTER: &str = "▲▲▲ ERROR OUTPUT ▲▲▲";
/// Report for the case when no process was started.
pub const NOT_INITIALIZED: &str = "PROCESS: Not initialized";

/// Formats a diagnostic block for the process `handle` suitable for assertion messages.
///
/// The block contains the exit code, the recorded failure (if any), and the trimmed stdout /
/// stderr each surrounded with a header and a footer. Empty streams are omitted.
/// If the process is still running, the output captured so far is reported.
///
/// # Examples
///
/// ```
/// # use proc_harness::report::format_outcome;
/// assert_eq!(format_outcome(None), "PROCESS: Not initialized\n");
/// ```
pub fn format_outcome(handle: Option<&ProcessHandle>) -> String {
    let Some(handle) = handle else {
        return format!("{NOT_INITIALIZED}\n");
    };

    if let Some(outcome) = handle.outcome() {
        return format_exit_outcome(outcome);
    }
    format_parts(
        None,
        None,
        &handle.stdout_text(),
        &handle.stderr_text(),
    )
}

/// Formats a diagnostic block for a terminated process, in the same way as [`format_outcome()`].
pub fn format_exit_outcome(outcome: &ExitOutcome) -> String {
    format_parts(
        outcome.exit_code(),
        outcome.failure().map(ToString::to_string),
        outcome.stdout(),
        outcome.stderr(),
    )
}

fn format_parts(
    exit_code: Option<i32>,
    failure: Option<String>,
    stdout: &str,
    stderr: &str,
) -> String {
    let mut report = match exit_code {
        Some(code) => format!("Exit code: {code}\n"),
        None => "Exit code: none\n".to_owned(),
    };
    if let Some(failure) = failure {
        writeln!(report, "Failure: {failure}").ok();
    }

    let blocks = [
        (stdout.trim(), STDOUT_HEADER, STDOUT_FOOTER),
        (stderr.trim(), STDERR_HEADER, STDERR_FOOTER),
    ];
    for (text, header, footer) in blocks {
        if !text.is_empty() {
            writeln!(report, "{header}\n{text}\n{footer}").ok();
        }
    }
    report
}
