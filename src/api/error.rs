//! Errors crossing the tracking shim's public boundary.

use thiserror::Error;

use crate::api::site::Site;

/// The underlying allocator could not satisfy a request.
///
/// This is the only failure the shim reports to callers. Registry overflow
/// and untracked releases are counted, never returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("allocation of {size} bytes failed at {site}")]
pub struct AllocError {
    /// Requested size in bytes.
    pub size: usize,

    /// Call-site of the failed request.
    pub site: Site,
}
