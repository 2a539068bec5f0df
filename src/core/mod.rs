//! Core bookkeeping shared by the shim and the reporting engine.

pub mod registry;
