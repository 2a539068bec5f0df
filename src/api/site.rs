//! Call-site identity attached to every tracked allocation.

use std::fmt;
use std::panic::Location;

/// Where an allocation was requested from.
///
/// Ordered by file, then line, so reports can break ties deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Site {
    file: &'static str,
    line: u32,
}

impl Site {
    /// Placeholder for allocations whose origin is not known.
    pub const UNKNOWN: Site = Site::new("<unknown>", 0);

    /// Create a site from a source file and line.
    pub const fn new(file: &'static str, line: u32) -> Self {
        Self { file, line }
    }

    /// The location of whoever called the function this is invoked from.
    ///
    /// Only meaningful inside a `#[track_caller]` function; elsewhere it
    /// names the line calling `caller()` itself.
    #[track_caller]
    pub fn caller() -> Self {
        Self::from(Location::caller())
    }

    /// Source file.
    pub const fn file(&self) -> &'static str {
        self.file
    }

    /// Line within the source file.
    pub const fn line(&self) -> u32 {
        self.line
    }

    /// Whether this is [`Site::UNKNOWN`].
    pub fn is_unknown(&self) -> bool {
        *self == Self::UNKNOWN
    }
}

impl From<&'static Location<'static>> for Site {
    fn from(location: &'static Location<'static>) -> Self {
        Self::new(location.file(), location.line())
    }
}

impl Default for Site {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Build a [`Site`] for the current source line.
///
/// ```rust
/// let site = heapwatch::site!();
/// assert_eq!(site.line(), line!() - 1);
/// ```
#[macro_export]
macro_rules! site {
    () => {
        $crate::Site::new(file!(), line!())
    };
}
