//! Core type definitions.

use std::{fmt, process, time::Duration};

/// Kind of an output stream of a child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum StreamKind {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        })
    }
}

/// Portable, platform-independent version of [`ExitStatus`](process::ExitStatus)
/// from the standard library.
///
/// On Unix, a process terminated by a signal gets the exit code `128 + signal`, in the same way
/// as shells report it. E.g., a process killed on timeout has exit code 137.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ExitStatus(pub i32);

impl ExitStatus {
    /// Checks if this is the successful status.
    pub fn is_success(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, formatter)
    }
}

impl From<process::ExitStatus> for ExitStatus {
    fn from(status: process::ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return Self(code);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt as _;

            if let Some(signal) = status.signal() {
                return Self(128 + signal);
            }
        }
        Self(-1)
    }
}

/// Reason why a process has not run to completion.
///
/// Failures are never returned as errors by [`ProcessRunner`](crate::ProcessRunner);
/// instead, they are recorded in the [`ExitOutcome`] so that tests can assert on them.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(
    feature = "serde",
    serde(tag = "kind", content = "details", rename_all = "snake_case")
)]
#[non_exhaustive]
pub enum RunFailure {
    /// The process has exceeded its total time budget and was killed.
    Timeout(Duration),
    /// The process has not produced any output for the specified duration and was killed.
    IdleTimeout(Duration),
    /// The process could not be spawned, or communicating with it has failed.
    Execution(String),
}

impl RunFailure {
    /// Checks whether this failure is caused by either of timeouts.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::IdleTimeout(_))
    }
}

impl fmt::Display for RunFailure {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout(timeout) => {
                write!(formatter, "process exceeded the timeout of {timeout:?}")
            }
            Self::IdleTimeout(timeout) => {
                write!(
                    formatter,
                    "process produced no output for the idle timeout of {timeout:?}"
                )
            }
            Self::Execution(message) => write!(formatter, "process execution failed: {message}"),
        }
    }
}

/// Final record of a process run: exit status, captured output and an optional failure.
///
/// Outcomes are immutable; they are created once the process terminates.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ExitOutcome {
    status: Option<ExitStatus>,
    stdout: String,
    stderr: String,
    failure: Option<RunFailure>,
}

impl ExitOutcome {
    pub(crate) fn new(
        status: Option<ExitStatus>,
        stdout: &[u8],
        stderr: &[u8],
        failure: Option<RunFailure>,
    ) -> Self {
        Self {
            status,
            stdout: String::from_utf8_lossy(stdout).into_owned(),
            stderr: String::from_utf8_lossy(stderr).into_owned(),
            failure,
        }
    }

    /// Returns the exit status of the process. This is `None` if the process was never spawned.
    pub fn status(&self) -> Option<ExitStatus> {
        self.status
    }

    /// Returns the exit code of the process, if available.
    pub fn exit_code(&self) -> Option<i32> {
        self.status.map(|status| status.0)
    }

    /// Captured standard output. Invalid UTF-8 sequences are replaced.
    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    /// Captured standard error. Invalid UTF-8 sequences are replaced.
    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    /// Returns the failure that has prevented the process from running to completion.
    pub fn failure(&self) -> Option<&RunFailure> {
        self.failure.as_ref()
    }

    /// Checks whether the process has run to completion and exited with the zero code.
    pub fn is_success(&self) -> bool {
        self.failure.is_none() && self.status.map_or(false, ExitStatus::is_success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_success_requires_zero_code_and_no_failure() {
        let outcome = ExitOutcome::new(Some(ExitStatus(0)), b"ok", b"", None);
        assert!(outcome.is_success());
        assert_eq!(outcome.stdout(), "ok");

        let outcome = ExitOutcome::new(Some(ExitStatus(2)), b"", b"", None);
        assert!(!outcome.is_success());

        let failure = RunFailure::Timeout(Duration::from_secs(1));
        let outcome = ExitOutcome::new(Some(ExitStatus(0)), b"", b"", Some(failure));
        assert!(!outcome.is_success());

        let outcome = ExitOutcome::new(None, b"", b"", None);
        assert!(!outcome.is_success());
        assert_eq!(outcome.exit_code(), None);
    }

    #[test]
    fn outcome_replaces_invalid_utf8() {
        let outcome = ExitOutcome::new(Some(ExitStatus(0)), b"\xff!", b"", None);
        assert_eq!(outcome.stdout(), "\u{fffd}!");
    }

    #[test]
    fn displaying_failures() {
        let failure = RunFailure::IdleTimeout(Duration::from_millis(500));
        assert_eq!(
            failure.to_string(),
            "process produced no output for the idle timeout of 500ms"
        );
        assert!(failure.is_timeout());

        let failure = RunFailure::Execution("No such file or directory".to_owned());
        assert!(!failure.is_timeout());
        assert!(failure.to_string().ends_with("No such file or directory"));
    }

    #[cfg(unix)]
    #[test]
    fn converting_signal_exit_status() {
        use std::os::unix::process::ExitStatusExt as _;

        let status = process::ExitStatus::from_raw(9); // killed by SIGKILL
        assert_eq!(ExitStatus::from(status), ExitStatus(137));
        let status = process::ExitStatus::from_raw(3 << 8); // exited with code 3
        assert_eq!(ExitStatus::from(status), ExitStatus(3));
    }
}
