//! Writers routing streamed output through `print!`.

use is_terminal::IsTerminal;
use termcolor::{Ansi, ColorChoice, ColorSpec, StandardStream, WriteColor};

use std::io::{self, Write};

#[cfg(test)]
use self::tests::print_to_buffer;

// Patch `print!` for testing similarly to how it is patched in `std`.
#[cfg(test)]
macro_rules! print {
    ($($arg:tt)*) => (print_to_buffer(std::format_args!($($arg)*)));
}

/// `Write`r that uses `print!` for output.
///
/// # Why is this needed?
///
/// Process output is streamed from within tests, where the output is captured by default.
/// Capturing is implemented by effectively overriding the `std::print*` family of macros
/// (see `std::io::_print()` for details). Writing to `io::stdout()` directly bypasses capturing,
/// so streamed output of passing tests would clutter the test runner output.
///
/// Output is printed line by line as soon as a line is terminated with `\n` or `\r`,
/// so that progress-style lines overwriting each other are streamed in real time.
/// Invalid UTF-8 sequences are replaced.
#[derive(Debug, Default)]
pub(crate) struct PrintlnWriter {
    line_buffer: Vec<u8>,
}

impl PrintlnWriter {
    fn print_line_buffer(&mut self) {
        print!("{}", String::from_utf8_lossy(&self.line_buffer));
        self.line_buffer.clear();
    }
}

impl Write for PrintlnWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut rest = buf;
        while let Some(pos) = rest.iter().position(|&byte| byte == b'\n' || byte == b'\r') {
            let (line, tail) = rest.split_at(pos + 1);
            self.line_buffer.extend_from_slice(line);
            self.print_line_buffer();
            rest = tail;
        }
        self.line_buffer.extend_from_slice(rest);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.line_buffer.is_empty() {
            self.print_line_buffer();
        }
        Ok(())
    }
}

/// Test-captured stdout for streamed process output. ANSI escapes are emitted only
/// if coloring is enabled; otherwise, color changes are ignored.
pub(crate) struct CapturedStdout {
    inner: Ansi<PrintlnWriter>,
    use_color: bool,
}

impl CapturedStdout {
    pub fn new(color_choice: ColorChoice) -> Self {
        Self {
            inner: Ansi::new(PrintlnWriter::default()),
            use_color: Self::use_color(color_choice),
        }
    }

    fn use_color(color_choice: ColorChoice) -> bool {
        match color_choice {
            ColorChoice::Never => false,
            ColorChoice::Always | ColorChoice::AlwaysAnsi => true,
            // Captured output ends up on the stdout of the test runner.
            ColorChoice::Auto => {
                io::stdout().is_terminal() && StandardStream::stdout(color_choice).supports_color()
            }
        }
    }
}

impl Write for CapturedStdout {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl WriteColor for CapturedStdout {
    fn supports_color(&self) -> bool {
        self.use_color
    }

    fn set_color(&mut self, spec: &ColorSpec) -> io::Result<()> {
        if self.use_color {
            self.inner.set_color(spec)
        } else {
            Ok(())
        }
    }

    fn reset(&mut self) -> io::Result<()> {
        if self.use_color {
            self.inner.reset()
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
pub(crate) use self::tests::take_captured;
