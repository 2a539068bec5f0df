//! Strict mode handling for diagnostics.
//!
//! Allows configuration of how tracking anomalies are treated:
//! - Off: just emit the diagnostic
//! - PanicOnError / PanicOnWarning: emit and then panic (useful for CI)
//!
//! Allocation failures are never escalated: they are returned to the caller
//! as errors whatever the mode.
//!
//! Strict mode is a per-shim setting, see
//! [`TrackerConfig::strict`](crate::TrackerConfig).

use std::str::FromStr;

use super::kind::DiagnosticKind;
use crate::api::config::ParseConfigError;

/// Strict mode behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrictMode {
    /// Just report, don't panic.
    #[default]
    Off,
    /// Panic on errors (duplicate live addresses).
    PanicOnError,
    /// Panic on errors and warnings (also untracked releases, full registry).
    PanicOnWarning,
}

impl StrictMode {
    /// Check if a diagnostic of this kind should panic.
    pub fn should_panic(&self, kind: DiagnosticKind) -> bool {
        match (self, kind) {
            (StrictMode::Off, _) => false,
            (StrictMode::PanicOnError, DiagnosticKind::Error) => true,
            (StrictMode::PanicOnError, _) => false,
            (StrictMode::PanicOnWarning, DiagnosticKind::Error | DiagnosticKind::Warning) => true,
            (StrictMode::PanicOnWarning, _) => false,
        }
    }
}

impl FromStr for StrictMode {
    type Err = ParseConfigError;

    /// Accepts `0`/`off`/`warn`, `1`/`error`, `2`/`warning`/`all`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "0" | "off" | "warn" | "false" => Ok(StrictMode::Off),
            "1" | "error" | "true" => Ok(StrictMode::PanicOnError),
            "2" | "warning" | "all" => Ok(StrictMode::PanicOnWarning),
            _ => Err(ParseConfigError::new("strict mode", value)),
        }
    }
}
