//! Invoking processes from tests: tokenizing commands, streaming output while the process runs,
//! and asserting on the outcome.
//!
//! # What it does
//!
//! This crate allows to:
//!
//! - Turn a shell-like command string (e.g., `git commit -m "Initial commit"`) into
//!   a validated [`Invocation`], merging it with explicit arguments and environment variables.
//! - Run the invocation with a [`ProcessRunner`], which enforces a total and an idle timeout
//!   and records a [`RunFailure`] instead of erroring if either is exceeded.
//! - Observe output while the process runs, either via a custom [`OnChunk`] callback or
//!   by streaming it through a [`StreamFormatter`] into the test output.
//! - Assert on the outcome (see the [`test` module](crate::test)), with failure messages
//!   containing a [diagnostic block](crate::report::format_outcome()) that includes
//!   the exit code and the captured output.
//!
//! # Design decisions
//!
//! - **No shell.** Commands are tokenized by the crate and executed directly, so there is
//!   no shell expansion, piping or redirection. The base command is restricted
//!   to `[A-Za-z0-9_.\-/]` chars.
//! - **Failures are data.** Timeouts and spawn errors do not make [`ProcessRunner::run()`]
//!   return an error; they are recorded in the [`ExitOutcome`] along with all output captured
//!   before the failure. This allows asserting on partial output.
//! - **Single live process.** A runner owns at most one process. Starting a new process
//!   kills the previous one if it is still running.
//! - **Test-friendly output.** Streamed output is printed with `print!`, so it is captured
//!   by the test harness and shown only for failing tests.
//!
//! # Crate features
//!
//! ## `tracing`
//!
//! *(Off by default)*
//!
//! Traces tokenizing, spawning processes and reading their output using the [`tracing`] facade.
//!
//! ## `serde`
//!
//! *(Off by default)*
//!
//! Derives `serde::Serialize` for [`ExitOutcome`] and related types.
//!
//! [`tracing`]: https://docs.rs/tracing/
//!
//! # Examples
//!
//! ```
//! use proc_harness::{Invocation, ProcessRunner, RunnerOptions, Value};
//! # use std::time::Duration;
//!
//! # fn main() -> anyhow::Result<()> {
//! // Streams output if the `DEBUG` env var is set.
//! let options = RunnerOptions::from_env().with_timeout(Duration::from_secs(10));
//! let mut runner = ProcessRunner::new(options);
//! let invocation = Invocation::build(
//!     "rustc --version",
//!     ["--verbose"],
//!     [("RUST_BACKTRACE", Value::from(false))],
//! )?;
//! let handle = runner.run(invocation, &[]);
//! assert!(handle.outcome().unwrap().is_success());
//!
//! runner.assert_success();
//! runner.assert_output_contains(["rustc", "host:"]);
//! # Ok(())
//! # }
//! ```
//!
//! Observing output with a callback:
//!
//! ```
//! # use proc_harness::{Invocation, ProcessRunner, RunnerOptions, StreamKind};
//! # fn main() -> anyhow::Result<()> {
//! let mut runner = ProcessRunner::new(RunnerOptions::default());
//! let mut stdout = vec![];
//! runner.run_with(
//!     Invocation::parse("rustc --version")?,
//!     &[],
//!     &mut |kind: StreamKind, chunk: &[u8]| {
//!         if kind == StreamKind::Stdout {
//!             stdout.extend_from_slice(chunk);
//!         }
//!     },
//! );
//! assert!(String::from_utf8(stdout)?.starts_with("rustc"));
//! # Ok(())
//! # }
//! ```

// Documentation settings.
#![doc(html_root_url = "https://docs.rs/proc-harness/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
// Linter settings.
#![warn(missing_debug_implementations, missing_docs, bare_trait_objects)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::must_use_candidate, clippy::module_name_repetitions)]

pub use self::{
    command::{tokenize, CommandError, Invocation, Value},
    runner::{ProcessHandle, ProcessRunner, RunnerOptions, STREAM_OUTPUT_ENV_VAR},
    stream::{split_lines, FormattingSink, Line, StreamFormatter, StreamMarkers},
    traits::OnChunk,
    types::{ExitOutcome, ExitStatus, RunFailure, StreamKind},
};

mod command;
pub mod report;
mod runner;
mod stream;
pub mod test;
mod traits;
mod types;
mod utils;

#[cfg(doctest)]
doc_comment::doctest!("../README.md");
