//! Diagnostic kinds and core types.
//!
//! Mirrors rustc's diagnostic levels for familiar UX.

/// The severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A hard error - something is definitely wrong.
    Error,
    /// A warning - something is probably wrong or tracking is degraded.
    Warning,
    /// Additional context, nothing is wrong.
    Note,
}

impl DiagnosticKind {
    /// Get the display prefix for this kind.
    pub fn prefix(&self) -> &'static str {
        match self {
            DiagnosticKind::Error => "error",
            DiagnosticKind::Warning => "warning",
            DiagnosticKind::Note => "note",
        }
    }
}

/// A diagnostic message with code, message, and optional context.
///
/// Diagnostic codes follow the pattern:
/// - `HW0xx` - Allocation failures
/// - `HW1xx` - Registry capacity
/// - `HW2xx` - Release and address anomalies
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Severity level.
    pub kind: DiagnosticKind,
    /// Diagnostic code (e.g., "HW001").
    pub code: &'static str,
    /// Primary message.
    pub message: &'static str,
    /// Optional additional context.
    pub note: Option<&'static str>,
    /// Optional fix suggestion.
    pub help: Option<&'static str>,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub const fn error(code: &'static str, message: &'static str) -> Self {
        Self::new(DiagnosticKind::Error, code, message)
    }

    /// Create a new warning diagnostic.
    pub const fn warning(code: &'static str, message: &'static str) -> Self {
        Self::new(DiagnosticKind::Warning, code, message)
    }

    /// Create a new note diagnostic.
    pub const fn note(code: &'static str, message: &'static str) -> Self {
        Self::new(DiagnosticKind::Note, code, message)
    }

    const fn new(kind: DiagnosticKind, code: &'static str, message: &'static str) -> Self {
        Self {
            kind,
            code,
            message,
            note: None,
            help: None,
        }
    }

    /// Add a note to this diagnostic.
    pub const fn with_note(mut self, note: &'static str) -> Self {
        self.note = Some(note);
        self
    }

    /// Add a help message to this diagnostic.
    pub const fn with_help(mut self, help: &'static str) -> Self {
        self.help = Some(help);
        self
    }
}

// =============================================================================
// Predefined diagnostics (HW0xx - Allocation failures)
// =============================================================================

/// HW001: Underlying allocator exhausted.
pub const HW001: Diagnostic = Diagnostic::error(
    "HW001",
    "underlying allocator could not satisfy a request"
).with_note("the failure was returned to the caller; a heap report is written to the sink when dump_on_failure is enabled")
 .with_help("check the report for the call-site holding the most memory, or enlarge the heap arena");

// =============================================================================
// Predefined diagnostics (HW1xx - Registry capacity)
// =============================================================================

/// HW101: Registry full, allocation left untracked.
pub const HW101: Diagnostic = Diagnostic::warning(
    "HW101",
    "allocation registry is full, new allocations are not tracked"
).with_note("the allocation itself succeeded; reports now under-count live memory")
 .with_help("increase registry_capacity in TrackerConfig, or use FullPolicy::EvictOldest");

/// HW102: Registry full, oldest record evicted.
pub const HW102: Diagnostic = Diagnostic::note(
    "HW102",
    "allocation registry is full, evicting the oldest records"
).with_note("evicted blocks will show up as untracked releases when freed")
 .with_help("increase registry_capacity in TrackerConfig to keep full history");

// =============================================================================
// Predefined diagnostics (HW2xx - Release and address anomalies)
// =============================================================================

/// HW201: Release of an address with no live record.
pub const HW201: Diagnostic = Diagnostic::warning(
    "HW201",
    "release of an address with no live allocation record"
).with_note("this is a double release, or a block allocated while the registry was full")
 .with_help("if untracked_allocs is zero, look for a double free at this call-site");

/// HW202: Underlying allocator returned an address that is already live.
pub const HW202: Diagnostic = Diagnostic::error(
    "HW202",
    "underlying allocator returned an address that is still live"
).with_note("the older record was replaced so bytes are not counted twice")
 .with_help("the block was probably released behind the tracker's back");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predefined_kinds() {
        assert_eq!(HW001.kind, DiagnosticKind::Error);
        assert_eq!(HW101.kind, DiagnosticKind::Warning);
        assert_eq!(HW102.kind, DiagnosticKind::Note);
        assert_eq!(HW201.kind.prefix(), "warning");
        assert!(HW202.help.is_some());
        assert!(HW001.note.is_some_and(|note| note.contains("dump_on_failure")));
    }
}
