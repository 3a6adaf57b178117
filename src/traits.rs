//! Traits for receiving output of child processes.

use std::io;

use crate::StreamKind;

/// Receiver of output chunks produced by a child process.
///
/// Chunks are delivered on the thread that waits for the process, in the order in which
/// they were read from the corresponding stream. There is no ordering guarantee between
/// chunks of different streams. A chunk may contain any number of lines, including
/// a partial line.
///
/// The trait is implemented for closures accepting `(StreamKind, &[u8])`:
///
/// ```no_run
/// # use proc_harness::{Invocation, ProcessRunner, RunnerOptions, StreamKind};
/// let mut runner = ProcessRunner::new(RunnerOptions::default());
/// let invocation = Invocation::parse("ls -la")?;
/// let mut chunk_count = 0;
/// runner.run_with(invocation, &[], &mut |_: StreamKind, _: &[u8]| chunk_count += 1);
/// # Ok::<_, proc_harness::CommandError>(())
/// ```
pub trait OnChunk {
    /// Processes a single chunk of output.
    ///
    /// # Errors
    ///
    /// Errors are logged, and the receiver is not invoked again during the current run.
    /// They do not influence the process or its outcome.
    fn on_chunk(&mut self, kind: StreamKind, chunk: &[u8]) -> io::Result<()>;

    /// Signals that the process has terminated and no more chunks will be delivered.
    ///
    /// # Errors
    ///
    /// Handled in the same way as errors from [`Self::on_chunk()`].
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<F> OnChunk for F
where
    F: FnMut(StreamKind, &[u8]),
{
    fn on_chunk(&mut self, kind: StreamKind, chunk: &[u8]) -> io::Result<()> {
        self(kind, chunk);
        Ok(())
    }
}
