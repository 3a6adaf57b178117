//! Misc utils.

use std::io;

/// Checks whether an error returned by `Child::kill()` means that the process has already
/// terminated, so there is nothing to kill.
pub(crate) fn is_terminated_process_error(err: &io::Error) -> bool {
    match err.kind() {
        io::ErrorKind::InvalidInput => true,
        // `TerminateProcess` reports terminated processes with `ERROR_ACCESS_DENIED`.
        io::ErrorKind::PermissionDenied => cfg!(windows),
        _ => false,
    }
}

/// Interprets a flag-like env variable value. Unset, empty and `0` values are falsy.
pub(crate) fn is_truthy_env_value(value: Option<&str>) -> bool {
    value.map_or(false, |value| !value.is_empty() && value != "0")
}
