//! Handle of a spawned process and its output loop.

use std::{
    borrow::Cow,
    io::{self, Read, Write},
    process::{Child, Command, Stdio},
    sync::mpsc,
    thread,
    time::{Duration, Instant},
};

use super::RunnerOptions;
use crate::{
    traits::OnChunk, utils::is_terminated_process_error, ExitOutcome, ExitStatus, Invocation,
    RunFailure, StreamKind,
};

/// Interval between checks whether the process has exited.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Max silence on the output streams after the process has terminated.
const DRAIN_GRACE_PERIOD: Duration = Duration::from_millis(100);
const READ_BUFFER_SIZE: usize = 4_096;

#[derive(Debug)]
enum Event {
    Chunk(StreamKind, Vec<u8>),
    Closed(StreamKind, io::Result<()>),
}

#[derive(Debug)]
struct Timeouts {
    started_at: Instant,
    last_output_at: Instant,
    total: Duration,
    idle: Duration,
}

impl Timeouts {
    fn new(options: &RunnerOptions) -> Self {
        let now = Instant::now();
        Self {
            started_at: now,
            last_output_at: now,
            total: options.timeout,
            idle: options.idle_timeout,
        }
    }

    fn record_output(&mut self) {
        self.last_output_at = Instant::now();
    }

    fn total_deadline(&self) -> Option<Instant> {
        self.started_at.checked_add(self.total)
    }

    /// Returns the time left until the nearest deadline, or the failure if a deadline has passed.
    /// The total timeout takes precedence over the idle one.
    fn remaining(&self) -> Result<Duration, RunFailure> {
        let now = Instant::now();
        let total_left = self
            .total
            .saturating_sub(now.saturating_duration_since(self.started_at));
        if total_left.is_zero() {
            return Err(RunFailure::Timeout(self.total));
        }
        let idle_left = self
            .idle
            .saturating_sub(now.saturating_duration_since(self.last_output_at));
        if idle_left.is_zero() {
            return Err(RunFailure::IdleTimeout(self.idle));
        }
        Ok(total_left.min(idle_left))
    }
}

/// Wrapper around an optional [`OnChunk`] that detaches it after the first error.
struct Forwarder<'a> {
    inner: Option<&'a mut dyn OnChunk>,
}

impl<'a> Forwarder<'a> {
    fn new(inner: Option<&'a mut dyn OnChunk>) -> Self {
        Self { inner }
    }

    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    fn forward(&mut self, kind: StreamKind, chunk: &[u8]) {
        if let Some(inner) = &mut self.inner {
            if let Err(err) = inner.on_chunk(kind, chunk) {
                #[cfg(feature = "tracing")]
                tracing::warn!(%err, %kind, "output callback failed; detaching it");
                self.inner = None;
            }
        }
    }

    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    fn finish(self) {
        if let Some(inner) = self.inner {
            if let Err(err) = inner.finish() {
                #[cfg(feature = "tracing")]
                tracing::warn!(%err, "finishing output callback failed");
            }
        }
    }
}

/// Handle of a process started by a [`ProcessRunner`](crate::ProcessRunner).
///
/// The handle accumulates raw output of the process and, after the process terminates,
/// holds its [`ExitOutcome`]. If the handle is dropped while the process is still running,
/// the process is killed.
#[derive(Debug)]
pub struct ProcessHandle {
    invocation: Invocation,
    child: Option<Child>,
    pid: Option<u32>,
    events: Option<mpsc::Receiver<Event>>,
    open_streams: usize,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    timeouts: Timeouts,
    notices: bool,
    outcome: Option<ExitOutcome>,
}

impl ProcessHandle {
    pub(super) fn spawn(invocation: Invocation, options: &RunnerOptions, inputs: &[&str]) -> Self {
        let mut this = Self {
            invocation,
            child: None,
            pid: None,
            events: None,
            open_streams: 0,
            stdout: vec![],
            stderr: vec![],
            timeouts: Timeouts::new(options),
            notices: options.notices,
            outcome: None,
        };

        if let Err(err) = this.spawn_child(options, inputs) {
            let failure = RunFailure::Execution(err.to_string());
            this.notify(&failure);
            this.outcome = Some(ExitOutcome::new(None, b"", b"", Some(failure)));
        }
        this
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip_all, err, fields(invocation = %self.invocation))
    )]
    fn spawn_child(&mut self, options: &RunnerOptions, inputs: &[&str]) -> io::Result<()> {
        let (stdout_reader, stdout_writer) = os_pipe::pipe()?;
        let (stderr_reader, stderr_writer) = os_pipe::pipe()?;
        #[cfg(feature = "tracing")]
        tracing::debug!("created OS pipes");

        let mut command = Command::new(self.invocation.program());
        command
            .args(self.invocation.args())
            .envs(self.invocation.env())
            .stdin(if inputs.is_empty() {
                Stdio::null()
            } else {
                Stdio::piped()
            })
            .stdout(stdout_writer)
            .stderr(stderr_writer);
        if let Some(dir) = &options.current_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn()?;
        // Drop pipe writers. This is necessary for the pipe readers to receive EOF.
        drop(command);
        #[cfg(feature = "tracing")]
        tracing::debug!(pid = child.id(), "spawned child");

        if let Some(stdin) = child.stdin.take() {
            Self::feed_stdin(stdin, inputs);
        }

        let (events_sx, events_rx) = mpsc::channel();
        Self::spawn_reader(StreamKind::Stdout, stdout_reader, events_sx.clone());
        Self::spawn_reader(StreamKind::Stderr, stderr_reader, events_sx);

        self.pid = Some(child.id());
        self.child = Some(child);
        self.events = Some(events_rx);
        self.open_streams = 2;
        Ok(())
    }

    /// Writes inputs from a separate thread, so that a process not reading its stdin
    /// cannot block the caller.
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    fn feed_stdin(mut stdin: impl Write + Send + 'static, inputs: &[&str]) {
        let mut input = inputs.join("\n");
        input.push('\n');
        thread::spawn(move || {
            #[cfg(feature = "tracing")]
            let _entered = tracing::debug_span!("stdin_thread", input.len = input.len()).entered();

            if let Err(err) = stdin.write_all(input.as_bytes()) {
                #[cfg(feature = "tracing")]
                tracing::debug!(%err, "failed writing inputs to stdin");
            }
            // `stdin` is dropped here, signalling EOF to the process.
        });
    }

    fn spawn_reader(
        kind: StreamKind,
        mut reader: impl Read + Send + 'static,
        events_sx: mpsc::Sender<Event>,
    ) {
        thread::spawn(move || {
            #[cfg(feature = "tracing")]
            let _entered = tracing::debug_span!("reader_thread", %kind).entered();

            let mut buffer = [0_u8; READ_BUFFER_SIZE];
            let result = loop {
                match reader.read(&mut buffer) {
                    Ok(0) => break Ok(()),
                    Ok(len) => {
                        #[cfg(feature = "tracing")]
                        tracing::debug!(len, "received chunk");

                        let chunk = buffer[..len].to_vec();
                        if events_sx.send(Event::Chunk(kind, chunk)).is_err() {
                            #[cfg(feature = "tracing")]
                            tracing::debug!("receiver dropped, breaking reader loop");
                            return;
                        }
                    }
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => { /* retry */ }
                    Err(err) => break Err(err),
                }
            };
            events_sx.send(Event::Closed(kind, result)).ok();
        });
    }

    /// Returns the invocation this process was started with.
    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    /// Returns the OS identifier of the process, or `None` if the process was not spawned.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Returns the raw stdout captured so far.
    pub fn stdout(&self) -> &[u8] {
        &self.stdout
    }

    /// Returns the raw stderr captured so far.
    pub fn stderr(&self) -> &[u8] {
        &self.stderr
    }

    /// Returns the stdout captured so far as a string, replacing invalid UTF-8 sequences.
    pub fn stdout_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    /// Returns the stderr captured so far as a string, replacing invalid UTF-8 sequences.
    pub fn stderr_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }

    /// Returns the outcome of the process. `None` while the process is not waited for.
    pub fn outcome(&self) -> Option<&ExitOutcome> {
        self.outcome.as_ref()
    }

    /// Returns the exit status of the process once it has terminated.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.outcome.as_ref()?.status()
    }

    /// Returns the recorded failure, if any.
    pub fn failure(&self) -> Option<&RunFailure> {
        self.outcome.as_ref()?.failure()
    }

    /// Checks whether the process has terminated and its outcome is available.
    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    /// Waits until the process terminates, forwarding output chunks to `on_chunk`.
    ///
    /// Enforces the total and idle timeouts from [`RunnerOptions`]. If either is exceeded,
    /// the process is killed, and the corresponding [`RunFailure`] is recorded in the outcome.
    /// All output captured before the kill is retained.
    ///
    /// If the process has already terminated, returns the recorded outcome immediately.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip_all, fields(pid = self.pid))
    )]
    pub fn wait(&mut self, on_chunk: Option<&mut dyn OnChunk>) -> &ExitOutcome {
        let outcome = match self.outcome.take() {
            Some(outcome) => outcome,
            None => {
                let mut forwarder = Forwarder::new(on_chunk);
                let outcome = self.drive(&mut forwarder);
                forwarder.finish();
                outcome
            }
        };
        self.outcome.insert(outcome)
    }

    fn drive(&mut self, forwarder: &mut Forwarder<'_>) -> ExitOutcome {
        let (status, failure) = match self.pump_output(forwarder) {
            Ok(status) => (Some(status), None),
            Err(failure) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(%failure, invocation = %self.invocation, "process failed");

                self.kill_child();
                let status = self.reap_child();
                self.drain_output(forwarder, Instant::now().checked_add(DRAIN_GRACE_PERIOD));
                self.notify(&failure);
                (status, Some(failure))
            }
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(
            ?status,
            stdout.len = self.stdout.len(),
            stderr.len = self.stderr.len(),
            "process terminated"
        );
        ExitOutcome::new(status, &self.stdout, &self.stderr, failure)
    }

    fn record_chunk(&mut self, kind: StreamKind, chunk: &[u8], forwarder: &mut Forwarder<'_>) {
        self.timeouts.record_output();
        match kind {
            StreamKind::Stdout => self.stdout.extend_from_slice(chunk),
            StreamKind::Stderr => self.stderr.extend_from_slice(chunk),
        }
        forwarder.forward(kind, chunk);
    }

    /// Reads output until the process exits, then collects the output still in flight.
    ///
    /// The exit is polled while reading: descendants of the process may keep its output
    /// streams open after it has exited. Conversely, the process may close its streams
    /// well before exiting, so timeouts are enforced until the exit.
    fn pump_output(&mut self, forwarder: &mut Forwarder<'_>) -> Result<ExitStatus, RunFailure> {
        loop {
            if let Some(status) = self.poll_exit()? {
                #[cfg(feature = "tracing")]
                tracing::debug!(?status, open_streams = self.open_streams, "process exited");
                self.drain_output(forwarder, self.timeouts.total_deadline());
                return Ok(status);
            }

            let wait_for = self.timeouts.remaining()?.min(EXIT_POLL_INTERVAL);
            let event = match &self.events {
                Some(events) if self.open_streams > 0 => events.recv_timeout(wait_for),
                _ => {
                    thread::sleep(wait_for);
                    continue;
                }
            };
            match event {
                Ok(Event::Chunk(kind, chunk)) => self.record_chunk(kind, &chunk, forwarder),
                Ok(Event::Closed(kind, result)) => {
                    self.open_streams -= 1;
                    if let Err(err) = result {
                        let message = format!("failed reading {kind}: {err}");
                        return Err(RunFailure::Execution(message));
                    }
                }
                Err(mpsc::RecvTimeoutError::Timeout) => { /* deadlines are checked above */ }
                Err(mpsc::RecvTimeoutError::Disconnected) => self.open_streams = 0,
            }
        }
    }

    fn poll_exit(&mut self) -> Result<Option<ExitStatus>, RunFailure> {
        let Some(child) = &mut self.child else {
            return Err(RunFailure::Execution("process was not spawned".to_owned()));
        };
        match child.try_wait() {
            Ok(status) => Ok(status.map(ExitStatus::from)),
            Err(err) => Err(RunFailure::Execution(err.to_string())),
        }
    }

    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    fn kill_child(&mut self) {
        let Some(child) = &mut self.child else {
            return;
        };
        if let Err(err) = child.kill() {
            if !is_terminated_process_error(&err) {
                #[cfg(feature = "tracing")]
                tracing::warn!(%err, pid = child.id(), "failed killing process");
            }
        } else {
            #[cfg(feature = "tracing")]
            tracing::debug!(pid = child.id(), "killed process");
        }
    }

    fn reap_child(&mut self) -> Option<ExitStatus> {
        let status = self.child.as_mut()?.wait().ok()?;
        Some(status.into())
    }

    /// Collects output that is still in flight after the process has terminated. Stops once
    /// both streams are closed, no output arrives for [`DRAIN_GRACE_PERIOD`], or `deadline`
    /// passes. Reader threads blocked on pipes held by orphaned descendants are left detached.
    fn drain_output(&mut self, forwarder: &mut Forwarder<'_>, deadline: Option<Instant>) {
        while self.open_streams > 0 {
            let time_left = deadline.map_or(DRAIN_GRACE_PERIOD, |deadline| {
                deadline.saturating_duration_since(Instant::now())
            });
            if time_left.is_zero() {
                break;
            }
            let Some(events) = &self.events else {
                break;
            };
            match events.recv_timeout(time_left.min(DRAIN_GRACE_PERIOD)) {
                Ok(Event::Chunk(kind, chunk)) => self.record_chunk(kind, &chunk, forwarder),
                Ok(Event::Closed(..)) => self.open_streams -= 1,
                Err(_) => break,
            }
        }
        // Unblocks reader threads on their next `send()`.
        self.events = None;
    }

    fn notify(&self, failure: &RunFailure) {
        if !self.notices {
            return;
        }
        let title = if failure.is_timeout() {
            "PROCESS TIMED OUT: "
        } else {
            "PROCESS ERROR: "
        };
        println!("{title}{}\n{failure}", self.invocation);
    }

    /// Stops the process: kills it if it is still running and reaps it. No failure is recorded,
    /// and output that is not yet read is discarded.
    pub fn stop(&mut self) {
        if self.outcome.is_some() {
            return;
        }
        self.kill_child();
        let status = self.reap_child();
        self.events = None;
        self.outcome = Some(ExitOutcome::new(status, &self.stdout, &self.stderr, None));
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
