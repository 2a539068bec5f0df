//! Size helper functions.

use std::fmt;

/// Convert kilobytes to bytes.
#[inline]
pub const fn kb(n: usize) -> usize {
    n * 1024
}

/// Convert megabytes to bytes.
#[inline]
pub const fn mb(n: usize) -> usize {
    n * 1024 * 1024
}

/// Human-readable byte count that formats without building a `String`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteSize(pub usize);

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const KB: usize = 1024;
        const MB: usize = KB * 1024;

        let bytes = self.0;
        if bytes >= MB {
            write!(f, "{:.2} MB", bytes as f64 / MB as f64)
        } else if bytes >= KB {
            write!(f, "{:.2} KB", bytes as f64 / KB as f64)
        } else {
            write!(f, "{} B", bytes)
        }
    }
}
