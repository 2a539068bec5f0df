//! Diagnostics: anomaly events, heap reports and out-of-memory hooks.
//!
//! This module provides:
//! - **Coded diagnostics**: rustc-style messages for tracking anomalies
//! - **Reports**: fixed-size snapshots of the registry, grouped by call-site
//! - **Sinks**: line-oriented channels reports are written to
//! - **Failure hook**: out-of-memory dump and callback
//! - **Strict mode**: optional panic-on-anomaly for CI
//!
//! ## Diagnostic Codes
//!
//! | Code  | Meaning                                   |
//! |-------|-------------------------------------------|
//! | HW0xx | Allocation failures                       |
//! | HW1xx | Registry capacity                         |
//! | HW2xx | Release and address anomalies             |

pub mod emit;
pub mod kind;
pub mod report;
pub mod sink;
pub mod strict;

pub(crate) mod hooks;

pub use emit::{emit, is_suppressed, suppress_diagnostics};
pub use hooks::OutOfMemory;
pub use kind::{Diagnostic, DiagnosticKind};
pub use kind::{HW001, HW101, HW102, HW201, HW202};
pub use report::{HeapReport, Report, SiteTable, SiteUsage, DEFAULT_OLDEST, DEFAULT_SITES};
#[cfg(feature = "log")]
pub use sink::LogSink;
pub use sink::{CollectingSink, DiagnosticSink, NullSink, StderrSink};
pub use strict::StrictMode;
