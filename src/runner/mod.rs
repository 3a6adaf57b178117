//! Running child processes with timeouts and output streaming.

use termcolor::ColorChoice;

use std::{env, path::PathBuf, time::Duration};

use crate::{
    stream::{CapturedStdout, FormattingSink, StreamFormatter, StreamMarkers},
    traits::OnChunk,
    utils::is_truthy_env_value,
    Invocation,
};

mod handle;

pub use self::handle::ProcessHandle;

/// Name of the env variable enabling output streaming in [`RunnerOptions::from_env()`].
pub const STREAM_OUTPUT_ENV_VAR: &str = "DEBUG";

/// Options for a [`ProcessRunner`].
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    pub(crate) current_dir: Option<PathBuf>,
    pub(crate) timeout: Duration,
    pub(crate) idle_timeout: Duration,
    pub(crate) stream_output: bool,
    pub(crate) color_choice: ColorChoice,
    pub(crate) markers: StreamMarkers,
    pub(crate) dim: bool,
    pub(crate) notices: bool,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            current_dir: None,
            timeout: Self::DEFAULT_TIMEOUT,
            idle_timeout: Self::DEFAULT_IDLE_TIMEOUT,
            stream_output: false,
            color_choice: ColorChoice::Auto,
            markers: StreamMarkers::default(),
            dim: true,
            notices: true,
        }
    }
}

impl RunnerOptions {
    /// Default total timeout for a process.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
    /// Default idle timeout for a process.
    pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

    /// Creates default options and enables output streaming if the [`STREAM_OUTPUT_ENV_VAR`]
    /// env variable is set to a non-empty value other than `0`.
    pub fn from_env() -> Self {
        let stream_output = env::var(STREAM_OUTPUT_ENV_VAR).ok();
        Self::default().with_stream_output(is_truthy_env_value(stream_output.as_deref()))
    }

    /// Sets the working directory for spawned processes. By default, processes inherit
    /// the working directory of the current process.
    #[must_use]
    pub fn with_current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Sets the total timeout for a process. The default value is 60 seconds.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the idle timeout, i.e., the maximum period during which the process may produce
    /// no output on either stream. The default value is 30 seconds.
    #[must_use]
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Sets whether process output should be streamed while the process runs.
    /// Streamed output is printed using `print!`, so it is captured by the test harness.
    #[must_use]
    pub fn with_stream_output(mut self, stream_output: bool) -> Self {
        self.stream_output = stream_output;
        self
    }

    /// Sets the color choice for streamed output. Dimming is applied only if
    /// the color choice allows it.
    #[must_use]
    pub fn with_color_choice(mut self, color_choice: ColorChoice) -> Self {
        self.color_choice = color_choice;
        self
    }

    /// Sets markers prepended to streamed lines.
    #[must_use]
    pub fn with_markers(mut self, markers: StreamMarkers) -> Self {
        self.markers = markers;
        self
    }

    /// Sets whether streamed lines should be dimmed.
    #[must_use]
    pub fn with_dimming(mut self, dim: bool) -> Self {
        self.dim = dim;
        self
    }

    /// Sets whether timeout and execution failures should be announced via `println!`
    /// when they occur. Enabled by default.
    #[must_use]
    pub fn with_notices(mut self, notices: bool) -> Self {
        self.notices = notices;
        self
    }

    /// Returns the total timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the idle timeout.
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Checks whether output streaming is enabled.
    pub fn stream_output(&self) -> bool {
        self.stream_output
    }

    fn formatter(&self) -> StreamFormatter {
        StreamFormatter::new(self.markers.clone()).with_dimming(self.dim)
    }
}

/// Runner of child processes owning at most one live [`ProcessHandle`].
///
/// Starting a new process releases the previous one: if it is still running, it is killed
/// and reaped. The same happens when the runner is dropped.
///
/// # Examples
///
/// ```no_run
/// # use proc_harness::{Invocation, ProcessRunner, RunnerOptions};
/// # use std::time::Duration;
/// let options = RunnerOptions::from_env().with_timeout(Duration::from_secs(10));
/// let mut runner = ProcessRunner::new(options);
/// let invocation = Invocation::build("git status", ["--porcelain"], [] as [(&str, _); 0])?;
/// let handle = runner.run(invocation, &[]);
/// assert_eq!(handle.outcome().and_then(|outcome| outcome.exit_code()), Some(0));
/// runner.assert_success();
/// # Ok::<_, proc_harness::CommandError>(())
/// ```
#[derive(Debug, Default)]
pub struct ProcessRunner {
    options: RunnerOptions,
    handle: Option<ProcessHandle>,
}

impl ProcessRunner {
    /// Creates a runner with the specified options.
    pub fn new(options: RunnerOptions) -> Self {
        Self {
            options,
            handle: None,
        }
    }

    /// Returns options of this runner.
    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    /// Returns a mutable reference to options of this runner. Changed options are applied
    /// to subsequently started processes.
    pub fn options_mut(&mut self) -> &mut RunnerOptions {
        &mut self.options
    }

    /// Returns the handle of the most recently started process, if any.
    pub fn handle(&self) -> Option<&ProcessHandle> {
        self.handle.as_ref()
    }

    /// Kills the current process (if it is still running) and discards its handle.
    pub fn release(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.stop();
        }
    }

    /// Spawns a process without waiting for it to terminate. `inputs` are joined with `\n`
    /// and fed to the process stdin, terminated with `\n`. If `inputs` are empty,
    /// stdin is connected to the null device.
    ///
    /// The previous process, if any, is [released](Self::release()) first.
    /// Spawn failures are not returned; they are recorded in the handle outcome.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            level = "debug",
            skip(self, invocation),
            fields(invocation = %invocation)
        )
    )]
    pub fn start(&mut self, invocation: Invocation, inputs: &[&str]) -> &mut ProcessHandle {
        self.release();
        let handle = ProcessHandle::spawn(invocation, &self.options, inputs);
        self.handle.insert(handle)
    }

    /// Runs a process to completion.
    ///
    /// If output streaming is enabled in the runner options, the output is formatted
    /// with a [`StreamFormatter`] and printed while the process runs.
    pub fn run(&mut self, invocation: Invocation, inputs: &[&str]) -> &ProcessHandle {
        if self.options.stream_output {
            let writer = CapturedStdout::new(self.options.color_choice);
            let mut sink = FormattingSink::new(self.options.formatter(), writer);
            self.run_with(invocation, inputs, &mut sink)
        } else {
            let handle = self.start(invocation, inputs);
            handle.wait(None);
            handle
        }
    }

    /// Runs a process to completion, forwarding each output chunk to `on_chunk`
    /// as soon as it is read.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            skip(self, invocation, on_chunk),
            fields(
                invocation = %invocation,
                options.timeout = ?self.options.timeout,
                options.idle_timeout = ?self.options.idle_timeout
            )
        )
    )]
    pub fn run_with(
        &mut self,
        invocation: Invocation,
        inputs: &[&str],
        on_chunk: &mut dyn OnChunk,
    ) -> &ProcessHandle {
        let handle = self.start(invocation, inputs);
        handle.wait(Some(on_chunk));
        handle
    }

    /// Formats the diagnostic block for the current process, as per [`format_outcome()`].
    ///
    /// [`format_outcome()`]: crate::report::format_outcome()
    pub fn report(&self) -> String {
        crate::report::format_outcome(self.handle.as_ref())
    }
}
