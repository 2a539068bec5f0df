//! Public API for heapwatch.
//!
//! This module contains the user-facing types: the shim, its
//! configuration, call-sites, errors and statistics.

pub mod config;
pub mod error;
pub mod shim;
pub mod site;
pub mod stats;
