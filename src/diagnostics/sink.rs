//! Line-oriented output channels for heap reports.
//!
//! A sink is whatever the board exposes for text: a UART console, a log
//! backend, a ring buffer. Write failures are swallowed: diagnostics must
//! never become a new failure source.

use std::fmt;
use std::io::Write;
use std::sync::Arc;

use crate::sync::mutex::Mutex;

/// A text sink accepting one formatted line at a time.
pub trait DiagnosticSink: Send + Sync {
    /// Write one line (without trailing newline). Errors are ignored.
    fn write_line(&self, line: fmt::Arguments<'_>);
}

impl<S: DiagnosticSink + ?Sized> DiagnosticSink for &S {
    fn write_line(&self, line: fmt::Arguments<'_>) {
        (**self).write_line(line)
    }
}

impl<S: DiagnosticSink + ?Sized> DiagnosticSink for Arc<S> {
    fn write_line(&self, line: fmt::Arguments<'_>) {
        (**self).write_line(line)
    }
}

impl<S: DiagnosticSink + ?Sized> DiagnosticSink for Box<S> {
    fn write_line(&self, line: fmt::Arguments<'_>) {
        (**self).write_line(line)
    }
}

/// Writes lines to the process's stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrSink;

impl DiagnosticSink for StderrSink {
    fn write_line(&self, line: fmt::Arguments<'_>) {
        let _ = writeln!(std::io::stderr().lock(), "{}", line);
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn write_line(&self, _line: fmt::Arguments<'_>) {}
}

/// Forwards lines to the `log` crate at a fixed level.
#[cfg(feature = "log")]
#[derive(Debug, Clone, Copy)]
pub struct LogSink {
    level: log::Level,
}

#[cfg(feature = "log")]
impl LogSink {
    /// Create a sink logging at `level`.
    pub const fn new(level: log::Level) -> Self {
        Self { level }
    }
}

#[cfg(feature = "log")]
impl Default for LogSink {
    fn default() -> Self {
        Self::new(log::Level::Info)
    }
}

#[cfg(feature = "log")]
impl DiagnosticSink for LogSink {
    fn write_line(&self, line: fmt::Arguments<'_>) {
        log::log!(target: "heapwatch", self.level, "{}", line);
    }
}

/// Keeps every line in memory.
///
/// Useful in tests, or as a buffer a console command drains later.
#[derive(Default)]
pub struct CollectingSink {
    lines: Mutex<Vec<String>>,
}

impl CollectingSink {
    /// Create a new collecting sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all collected lines.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Take all collected lines, leaving the sink empty.
    pub fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.lines.lock())
    }

    /// Clear collected lines.
    pub fn clear(&self) {
        self.lines.lock().clear();
    }

    /// Check if any collected line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|line| line.contains(needle))
    }
}

impl DiagnosticSink for CollectingSink {
    fn write_line(&self, line: fmt::Arguments<'_>) {
        self.lines.lock().push(line.to_string());
    }
}
