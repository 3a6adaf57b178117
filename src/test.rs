//! Assertions on processes run by a [`ProcessRunner`].
//!
//! All assertions panic with a diagnostic block (see [`format_outcome()`]) appended to
//! the message, so that a failing test shows what the process has output. If no process
//! was run, assertions panic with the "Process is not initialized" message.
//!
//! # Examples
//!
//! ```no_run
//! # use proc_harness::{Invocation, ProcessRunner, RunnerOptions};
//! let mut runner = ProcessRunner::new(RunnerOptions::from_env());
//! runner.run(Invocation::parse("cargo --version")?, &[]);
//! runner.assert_success();
//! runner.assert_output_contains("cargo");
//! runner.assert_error_output_not_contains(["error", "warning"]);
//! // Entries starting with `---` must be absent.
//! runner.assert_output_contains_or_not(["cargo", "--- rustc"]);
//! # Ok::<_, proc_harness::CommandError>(())
//! ```
//!
//! [`format_outcome()`]: crate::report::format_outcome()

use std::borrow::Cow;

use crate::{report::format_exit_outcome, ExitOutcome, ProcessRunner};

/// Prefix of expected strings that must be absent in the output.
pub const ABSENT_PREFIX: &str = "---";

/// Text expected (or not expected) in process output: either a single string
/// or a collection of strings.
pub trait ExpectedText {
    /// Returns the expected strings.
    fn expected_strings(&self) -> Vec<Cow<'_, str>>;
}

impl ExpectedText for str {
    fn expected_strings(&self) -> Vec<Cow<'_, str>> {
        vec![Cow::Borrowed(self)]
    }
}

impl ExpectedText for String {
    fn expected_strings(&self) -> Vec<Cow<'_, str>> {
        vec![Cow::Borrowed(self)]
    }
}

impl<T: ExpectedText + ?Sized> ExpectedText for &T {
    fn expected_strings(&self) -> Vec<Cow<'_, str>> {
        (**self).expected_strings()
    }
}

impl<S: AsRef<str>> ExpectedText for [S] {
    fn expected_strings(&self) -> Vec<Cow<'_, str>> {
        self.iter().map(|s| Cow::Borrowed(s.as_ref())).collect()
    }
}

impl<S: AsRef<str>, const N: usize> ExpectedText for [S; N] {
    fn expected_strings(&self) -> Vec<Cow<'_, str>> {
        self.as_slice().expected_strings()
    }
}

impl<S: AsRef<str>> ExpectedText for Vec<S> {
    fn expected_strings(&self) -> Vec<Cow<'_, str>> {
        self.as_slice().expected_strings()
    }
}

/// Splits an expected entry into the text and whether it must be present.
/// The `---` prefix is stripped together with a single following space.
fn parse_presence(entry: &str) -> (&str, bool) {
    match entry.strip_prefix(ABSENT_PREFIX) {
        Some(rest) => (rest.strip_prefix(' ').unwrap_or(rest), false),
        None => (entry, true),
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Output,
    ErrorOutput,
}

impl Stream {
    fn name(self) -> &'static str {
        match self {
            Self::Output => "output",
            Self::ErrorOutput => "error output",
        }
    }

    fn text(self, outcome: &ExitOutcome) -> &str {
        match self {
            Self::Output => outcome.stdout(),
            Self::ErrorOutput => outcome.stderr(),
        }
    }
}

impl ProcessRunner {
    #[track_caller]
    fn finished_outcome(&self) -> &ExitOutcome {
        let Some(handle) = self.handle() else {
            panic!("Process is not initialized");
        };
        match handle.outcome() {
            Some(outcome) => outcome,
            None => panic!(
                "Process has not finished: {}\n{}",
                handle.invocation(),
                crate::report::format_outcome(Some(handle))
            ),
        }
    }

    /// Asserts that the process has run to completion and exited with the zero code.
    ///
    /// # Panics
    ///
    /// Panics with a `PROCESS FAILED` message otherwise.
    #[track_caller]
    pub fn assert_success(&self) {
        let outcome = self.finished_outcome();
        if !outcome.is_success() {
            let code = outcome
                .exit_code()
                .map_or_else(|| "none".to_owned(), |code| code.to_string());
            panic!(
                "PROCESS FAILED with exit code {code}\n{}",
                format_exit_outcome(outcome)
            );
        }
    }

    /// Asserts that the process has failed: exited with a non-zero code, timed out,
    /// or could not be executed.
    ///
    /// # Panics
    ///
    /// Panics with a `PROCESS SUCCEEDED but failure was expected` message otherwise.
    #[track_caller]
    pub fn assert_failure(&self) {
        let outcome = self.finished_outcome();
        if outcome.is_success() {
            panic!(
                "PROCESS SUCCEEDED but failure was expected\n{}",
                format_exit_outcome(outcome)
            );
        }
    }

    #[track_caller]
    fn assert_presence(&self, stream: Stream, value: &str, must_be_present: bool) {
        let outcome = self.finished_outcome();
        let is_present = stream.text(outcome).contains(value);
        if is_present != must_be_present {
            let problem = if must_be_present {
                "does not contain"
            } else {
                "contains"
            };
            let suffix = if must_be_present { "" } else { " but should not" };
            panic!(
                "Process {} {problem} '{value}'{suffix}.\n{}",
                stream.name(),
                format_exit_outcome(outcome)
            );
        }
    }

    #[track_caller]
    fn assert_all<E: ExpectedText>(&self, stream: Stream, expected: &E, present: bool) {
        for value in expected.expected_strings() {
            self.assert_presence(stream, &value, present);
        }
    }

    #[track_caller]
    fn assert_contains_or_not<E: ExpectedText>(&self, stream: Stream, expected: &E) {
        for entry in expected.expected_strings() {
            let (value, must_be_present) = parse_presence(&entry);
            self.assert_presence(stream, value, must_be_present);
        }
    }

    /// Asserts that the process stdout contains all `expected` strings.
    #[track_caller]
    pub fn assert_output_contains(&self, expected: impl ExpectedText) {
        self.assert_all(Stream::Output, &expected, true);
    }

    /// Asserts that the process stdout contains none of the `expected` strings.
    #[track_caller]
    pub fn assert_output_not_contains(&self, expected: impl ExpectedText) {
        self.assert_all(Stream::Output, &expected, false);
    }

    /// Asserts that the process stderr contains all `expected` strings.
    #[track_caller]
    pub fn assert_error_output_contains(&self, expected: impl ExpectedText) {
        self.assert_all(Stream::ErrorOutput, &expected, true);
    }

    /// Asserts that the process stderr contains none of the `expected` strings.
    #[track_caller]
    pub fn assert_error_output_not_contains(&self, expected: impl ExpectedText) {
        self.assert_all(Stream::ErrorOutput, &expected, false);
    }

    /// Asserts that the process stdout contains the `expected` strings, except for strings
    /// prefixed with `---`, which must be absent. The prefix and a single space after it
    /// are stripped before checking.
    #[track_caller]
    pub fn assert_output_contains_or_not(&self, expected: impl ExpectedText) {
        self.assert_contains_or_not(Stream::Output, &expected);
    }

    /// Same as [`Self::assert_output_contains_or_not()`], but for the process stderr.
    #[track_caller]
    pub fn assert_error_output_contains_or_not(&self, expected: impl ExpectedText) {
        self.assert_contains_or_not(Stream::ErrorOutput, &expected);
    }
}

#[cfg(test)]
mod tests {
    use test_casing::test_casing;

    use std::panic::{self, AssertUnwindSafe};

    use super::*;
    use crate::{Invocation, RunnerOptions};

    fn panic_message(action: impl FnOnce()) -> String {
        let err = panic::catch_unwind(AssertUnwindSafe(action)).unwrap_err();
        if let Some(message) = err.downcast_ref::<String>() {
            message.clone()
        } else if let Some(message) = err.downcast_ref::<&str>() {
            (*message).to_owned()
        } else {
            panic!("unexpected panic payload");
        }
    }

    #[test_casing(5, [
        ("--- error", ("error", false)),
        ("---error", ("error", false)),
        ("---  two spaces", (" two spaces", false)),
        ("plain", ("plain", true)),
        ("-- not a prefix", ("-- not a prefix", true)),
    ])]
    #[test]
    fn parsing_presence(entry: &str, expected: (&str, bool)) {
        assert_eq!(parse_presence(entry), expected);
    }

    #[test]
    fn expected_text_implementations() {
        assert_eq!("a".expected_strings(), ["a"]);
        assert_eq!(String::from("a").expected_strings(), ["a"]);
        assert_eq!(["a", "b"].expected_strings(), ["a", "b"]);
        assert_eq!(vec![String::from("a")].expected_strings(), ["a"]);
        let slice: &[&str] = &["x", "y"];
        assert_eq!(slice.expected_strings(), ["x", "y"]);
    }

    #[test]
    fn assertions_without_process() {
        let runner = ProcessRunner::new(RunnerOptions::default());
        let message = panic_message(|| runner.assert_success());
        assert_eq!(message, "Process is not initialized");
        let message = panic_message(|| runner.assert_output_contains("test"));
        assert_eq!(message, "Process is not initialized");
    }

    #[cfg(unix)]
    mod with_process {
        use super::*;

        fn run(script: &str) -> ProcessRunner {
            let mut runner = ProcessRunner::new(RunnerOptions::default().with_notices(false));
            let invocation = Invocation::new("sh")
                .unwrap()
                .with_arg("-c")
                .with_arg(script);
            runner.run(invocation, &[]);
            runner
        }

        #[test]
        fn success_assertions() {
            let runner = run("echo all good; echo note >&2");
            runner.assert_success();
            runner.assert_output_contains("all good");
            runner.assert_output_contains(["all", "good"]);
            runner.assert_output_not_contains(vec!["bad", "note"]);
            runner.assert_error_output_contains("note");
            runner.assert_error_output_not_contains("good");
            runner.assert_output_contains_or_not(["all good", "--- note"]);
            runner.assert_error_output_contains_or_not(["note", "---good"]);

            let message = panic_message(|| runner.assert_failure());
            assert!(
                message.starts_with("PROCESS SUCCEEDED but failure was expected\n"),
                "{message}"
            );
            assert!(message.contains("⬇⬇⬇ STANDARD OUTPUT ⬇⬇⬇\nall good\n"), "{message}");
        }

        #[test]
        fn failure_assertions() {
            let runner = run("echo partial; echo boom >&2; exit 2");
            runner.assert_failure();

            let message = panic_message(|| runner.assert_success());
            assert!(message.starts_with("PROCESS FAILED with exit code 2\n"), "{message}");
            assert!(message.contains("Exit code: 2\n"), "{message}");
            assert!(
                message.contains("▼▼▼ ERROR OUTPUT ▼▼▼\nboom\n▲▲▲ ERROR OUTPUT ▲▲▲"),
                "{message}"
            );
        }

        #[test]
        fn failed_contains_assertions() {
            let runner = run("echo hello");

            let message = panic_message(|| runner.assert_output_contains(["hello", "world"]));
            assert!(
                message.starts_with("Process output does not contain 'world'.\n"),
                "{message}"
            );

            let message = panic_message(|| runner.assert_output_not_contains("hell"));
            assert!(
                message.starts_with("Process output contains 'hell' but should not.\n"),
                "{message}"
            );

            let message = panic_message(|| runner.assert_output_contains_or_not("--- hello"));
            assert!(message.starts_with("Process output contains 'hello'"), "{message}");

            let message = panic_message(|| runner.assert_error_output_contains("hello"));
            assert!(
                message.starts_with("Process error output does not contain 'hello'.\n"),
                "{message}"
            );
        }
    }
}
