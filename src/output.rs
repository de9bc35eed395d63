//! User-facing output.
use std::io::{self, Write};

/// Line-oriented sink for everything the client shows its user.
pub trait Output {
    fn print(&mut self, text: &str);
    fn print_error(&mut self, text: &str);
}

/// Writes to stdout/stderr, flushing after every line so output is
/// visible before the next prompt.
#[derive(Debug, Default)]
pub struct Console;

impl Output for Console {
    fn print(&mut self, text: &str) {
        write_line(io::stdout().lock(), text);
    }

    fn print_error(&mut self, text: &str) {
        write_line(io::stderr().lock(), text);
    }
}

fn write_line<W: Write>(mut writer: W, text: &str) {
    // Nowhere left to report a broken console.
    let _ = writeln!(writer, "{text}").and_then(|_| writer.flush());
}

/// StdOut wrapper than automatically flushes content after every write.
pub struct StdOut<W: io::Write> {
    inner: W,
}

impl<W: io::Write> StdOut<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

impl<W: io::Write> io::Write for StdOut<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let res = self.inner.write(buf);
        if res.is_ok() {
            self.inner.flush()?
        }
        res
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
