//! Line-preserving formatting of streamed process output.

use termcolor::{ColorSpec, WriteColor};

use std::{borrow::Cow, io, mem};

use crate::{traits::OnChunk, StreamKind};

mod writer;

pub(crate) use self::writer::CapturedStdout;
#[cfg(test)]
pub(crate) use self::writer::take_captured;

/// Markers prepended to each streamed line, depending on the stream the line comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMarkers {
    /// Marker for stdout lines. `">> "` by default.
    pub stdout: Cow<'static, str>,
    /// Marker for stderr lines. `"XX "` by default.
    pub stderr: Cow<'static, str>,
}

impl Default for StreamMarkers {
    fn default() -> Self {
        Self {
            stdout: Cow::Borrowed(">> "),
            stderr: Cow::Borrowed("XX "),
        }
    }
}

impl StreamMarkers {
    /// Returns the marker for the specified stream.
    pub fn for_stream(&self, kind: StreamKind) -> &str {
        match kind {
            StreamKind::Stdout => &self.stdout,
            StreamKind::Stderr => &self.stderr,
        }
    }
}

/// Complete line produced by [`split_lines()`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line<'a> {
    /// Line contents without the line ending.
    pub text: &'a [u8],
    /// Original line ending: `\n`, `\r\n` or `\r`.
    pub ending: &'a [u8],
}

/// Splits `data` into complete lines and the trailing incomplete remainder.
///
/// Each of `\r\n`, `\n` and `\r` terminates a line; the ending is preserved in [`Line::ending`].
/// A trailing lone `\r` is a part of the remainder since it may be followed by `\n`
/// in the next chunk.
///
/// # Examples
///
/// ```
/// # use proc_harness::split_lines;
/// let (lines, rest) = split_lines(b"one\r\ntwo\rthree");
/// let texts: Vec<_> = lines.iter().map(|line| line.text).collect();
/// assert_eq!(texts, [b"one" as &[u8], b"two"]);
/// assert_eq!(lines[0].ending, b"\r\n");
/// assert_eq!(rest, b"three");
/// ```
pub fn split_lines(data: &[u8]) -> (Vec<Line<'_>>, &[u8]) {
    let mut lines = vec![];
    let mut line_start = 0;
    let mut pos = 0;
    while pos < data.len() {
        let ending_len = match (data[pos], data.get(pos + 1)) {
            (b'\n', _) => 1,
            (b'\r', Some(b'\n')) => 2,
            (b'\r', Some(_)) => 1,
            (b'\r', None) => break,
            _ => {
                pos += 1;
                continue;
            }
        };
        lines.push(Line {
            text: &data[line_start..pos],
            ending: &data[pos..pos + ending_len],
        });
        pos += ending_len;
        line_start = pos;
    }
    (lines, &data[line_start..])
}

/// Formatter of streamed process output.
///
/// The formatter splits incoming chunks into lines and prefixes each line with a stream-specific
/// [marker](StreamMarkers). Incomplete lines are carried over until the next chunk
/// of the same stream arrives, so a line split across chunks is output once with a single marker.
/// Optionally, lines are dimmed so that they are visually distinct from other test output.
///
/// # Examples
///
/// ```
/// # use proc_harness::{StreamFormatter, StreamKind};
/// # use termcolor::NoColor;
/// let mut formatter = StreamFormatter::default().with_dimming(false);
/// let mut output = NoColor::new(vec![]);
/// formatter.format(StreamKind::Stdout, b"Hello, ", &mut output)?;
/// formatter.format(StreamKind::Stderr, b"oops\n", &mut output)?;
/// formatter.format(StreamKind::Stdout, b"world!\n", &mut output)?;
///
/// let output = String::from_utf8(output.into_inner()).unwrap();
/// assert_eq!(output, "XX oops\n>> Hello, world!\n");
/// # Ok::<_, std::io::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct StreamFormatter {
    markers: StreamMarkers,
    dim: bool,
    stdout_partial: Vec<u8>,
    stderr_partial: Vec<u8>,
}

impl Default for StreamFormatter {
    fn default() -> Self {
        Self::new(StreamMarkers::default())
    }
}

impl StreamFormatter {
    /// Creates a formatter with the specified markers. Dimming is on.
    pub fn new(markers: StreamMarkers) -> Self {
        Self {
            markers,
            dim: true,
            stdout_partial: vec![],
            stderr_partial: vec![],
        }
    }

    /// Sets whether lines should be dimmed. Dimming has no effect for writers that do not
    /// support color.
    #[must_use]
    pub fn with_dimming(mut self, dim: bool) -> Self {
        self.dim = dim;
        self
    }

    /// Returns the incomplete line carried over for the specified stream.
    pub fn pending(&self, kind: StreamKind) -> &[u8] {
        match kind {
            StreamKind::Stdout => &self.stdout_partial,
            StreamKind::Stderr => &self.stderr_partial,
        }
    }

    fn partial_mut(&mut self, kind: StreamKind) -> &mut Vec<u8> {
        match kind {
            StreamKind::Stdout => &mut self.stdout_partial,
            StreamKind::Stderr => &mut self.stderr_partial,
        }
    }

    /// Formats a `chunk` from the specified stream and writes complete lines to the `writer`.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors from the `writer`.
    pub fn format(
        &mut self,
        kind: StreamKind,
        chunk: &[u8],
        writer: &mut impl WriteColor,
    ) -> io::Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }

        let mut data = mem::take(self.partial_mut(kind));
        data.extend_from_slice(chunk);
        let (lines, rest) = split_lines(&data);
        // The carry-over is updated before writing, so that it stays consistent on I/O errors.
        *self.partial_mut(kind) = rest.to_vec();

        for line in lines {
            self.write_line(kind, line, writer)?;
        }
        Ok(())
    }

    /// Flushes incomplete lines for both streams, terminating them with `\n`.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors from the `writer`.
    pub fn finish(&mut self, writer: &mut impl WriteColor) -> io::Result<()> {
        for kind in [StreamKind::Stdout, StreamKind::Stderr] {
            let partial = mem::take(self.partial_mut(kind));
            if partial.is_empty() {
                continue;
            }
            let line = match partial.strip_suffix(b"\r") {
                Some(text) => Line {
                    text,
                    ending: b"\r",
                },
                None => Line {
                    text: &partial,
                    ending: b"\n",
                },
            };
            self.write_line(kind, line, writer)?;
        }
        writer.flush()
    }

    fn write_line(
        &self,
        kind: StreamKind,
        line: Line<'_>,
        writer: &mut impl WriteColor,
    ) -> io::Result<()> {
        if line.text.is_empty() && line.ending.is_empty() {
            return Ok(());
        }

        if self.dim {
            writer.set_color(ColorSpec::new().set_dimmed(true))?;
        }
        writer.write_all(self.markers.for_stream(kind).as_bytes())?;
        writer.write_all(line.text)?;
        if self.dim {
            writer.reset()?;
        }
        writer.write_all(line.ending)
    }
}

/// [`OnChunk`] implementation that formats chunks with a [`StreamFormatter`] and writes them
/// to the wrapped writer.
#[derive(Debug)]
pub struct FormattingSink<W> {
    formatter: StreamFormatter,
    writer: W,
}

impl<W: WriteColor> FormattingSink<W> {
    /// Creates a new sink.
    pub fn new(formatter: StreamFormatter, writer: W) -> Self {
        Self { formatter, writer }
    }

    /// Returns the wrapped writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: WriteColor> OnChunk for FormattingSink<W> {
    fn on_chunk(&mut self, kind: StreamKind, chunk: &[u8]) -> io::Result<()> {
        self.formatter.format(kind, chunk, &mut self.writer)
    }

    fn finish(&mut self) -> io::Result<()> {
        self.formatter.finish(&mut self.writer)
    }
}
