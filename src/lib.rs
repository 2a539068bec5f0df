//! # heapwatch
//!
//! Allocation tracking for fixed-size embedded heaps.
//!
//! Wrap any [`RawAllocator`] in a [`TrackingShim`] and every live block gets
//! a record: size, call-site and a sequence number. When the heap is
//! exhausted the shim dumps what is holding memory, grouped by call-site,
//! and runs a registered callback.
//!
//! ## Features
//!
//! - Fixed-capacity registry, reserved up front
//! - Call-sites captured with `#[track_caller]`, no backtraces
//! - Allocation-free reports, safe to build on the out-of-memory path
//! - Untracked-allocation and untracked-release counters instead of failures
//! - Coded diagnostics (`HW001`, `HW101`, ...) through `log` or stderr
//! - Optional strict mode that panics on anomalies, for CI
//!
//! ## Quick Start
//!
//! ```rust
//! use heapwatch::{SystemHeap, TrackerConfig, TrackingShim, kb};
//!
//! let heap = SystemHeap::with_limit(kb(64));
//! let shim = TrackingShim::new(heap, TrackerConfig::default());
//!
//! shim.set_oom_handler(|event| {
//!     eprintln!("heap exhausted by a {} byte request", event.size);
//! });
//!
//! let frame = shim.allocate(1500).unwrap();
//! shim.print_report();
//! unsafe { shim.release(frame) };
//! ```
//!
//! ## Cargo features
//!
//! - `log` (default): route diagnostics through the `log` facade
//! - `parking_lot`: use `parking_lot` mutexes
//! - `diagnostics`: print diagnostics to stderr in release builds

pub mod allocators;
pub mod api;
pub mod core;
pub mod diagnostics;
pub mod util;

mod sync;

// Re-export public API at crate root for convenience
pub use api::config::{FullPolicy, ParseConfigError, TrackerConfig};
pub use api::error::AllocError;
pub use api::shim::TrackingShim;
pub use api::site::Site;
pub use api::stats::TrackerStats;

pub use allocators::{RawAllocator, SystemHeap};

pub use crate::core::registry::{AllocationRecord, Registry, RegistryFull, MAX_CAPACITY};

// Reports and hooks
pub use diagnostics::{HeapReport, Report, SiteTable, SiteUsage, DEFAULT_OLDEST, DEFAULT_SITES};
pub use diagnostics::OutOfMemory;

// Sinks
#[cfg(feature = "log")]
pub use diagnostics::LogSink;
pub use diagnostics::{CollectingSink, DiagnosticSink, NullSink, StderrSink};

// Diagnostics - Core types and predefined codes
pub use diagnostics::{Diagnostic, DiagnosticKind, StrictMode};
pub use diagnostics::{suppress_diagnostics, HW001, HW101, HW102, HW201, HW202};

pub use util::size::{kb, mb, ByteSize};
