//! Diagnostic emission backend.
//!
//! Anomaly diagnostics go to the `log` crate when the `log` feature is on,
//! otherwise to stderr in debug builds (or with the `diagnostics` feature).
//! Heap reports use a [`DiagnosticSink`](super::sink::DiagnosticSink)
//! instead; this module is for one-off events.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use super::kind::Diagnostic;
#[cfg(feature = "log")]
use super::kind::DiagnosticKind;
use super::strict::StrictMode;

/// Global flag to suppress diagnostic output (for testing).
static DIAGNOSTICS_SUPPRESSED: AtomicBool = AtomicBool::new(false);

/// Suppress all diagnostic output.
///
/// Strict mode still panics while output is suppressed.
pub fn suppress_diagnostics(suppress: bool) {
    DIAGNOSTICS_SUPPRESSED.store(suppress, Ordering::Relaxed);
}

/// Check if diagnostics are suppressed.
pub fn is_suppressed() -> bool {
    DIAGNOSTICS_SUPPRESSED.load(Ordering::Relaxed)
}

/// Emit a diagnostic with runtime context, then apply strict mode.
///
/// Callers must not hold the registry lock.
pub fn emit(diag: &Diagnostic, context: fmt::Arguments<'_>, strict: StrictMode) {
    if !is_suppressed() {
        #[cfg(feature = "log")]
        emit_to_log(diag, context);

        #[cfg(all(not(feature = "log"), any(debug_assertions, feature = "diagnostics")))]
        emit_to_stderr(diag, context);

        #[cfg(all(not(feature = "log"), not(any(debug_assertions, feature = "diagnostics"))))]
        let _ = context;
    }

    if strict.should_panic(diag.kind) {
        panic!(
            "[heapwatch][{}] {}\ncontext: {}\nStrict mode enabled - anomalies are fatal.",
            diag.code, diag.message, context
        );
    }
}

/// Internal: emit to stderr.
#[cfg(all(not(feature = "log"), any(debug_assertions, feature = "diagnostics")))]
fn emit_to_stderr(diag: &Diagnostic, context: fmt::Arguments<'_>) {
    use std::io::Write;

    let mut stderr = std::io::stderr().lock();

    let _ = writeln!(
        stderr,
        "[heapwatch][{}] {}: {}",
        diag.code,
        diag.kind.prefix(),
        diag.message
    );
    let _ = writeln!(stderr, "  context: {}", context);

    if let Some(note) = diag.note {
        let _ = writeln!(stderr, "  note: {}", note);
    }
    if let Some(help) = diag.help {
        let _ = writeln!(stderr, "  help: {}", help);
    }

    let _ = writeln!(stderr);
}

/// Internal: emit through the log crate.
#[cfg(feature = "log")]
fn emit_to_log(diag: &Diagnostic, context: fmt::Arguments<'_>) {
    match diag.kind {
        DiagnosticKind::Error => {
            log::error!(target: "heapwatch", "[{}] {} ({})", diag.code, diag.message, context);
        }
        DiagnosticKind::Warning => {
            log::warn!(target: "heapwatch", "[{}] {} ({})", diag.code, diag.message, context);
        }
        DiagnosticKind::Note => {
            log::info!(target: "heapwatch", "[{}] {} ({})", diag.code, diag.message, context);
        }
    }

    if let Some(note) = diag.note {
        log::debug!(target: "heapwatch", "  note: {}", note);
    }
    if let Some(help) = diag.help {
        log::debug!(target: "heapwatch", "  help: {}", help);
    }
}
