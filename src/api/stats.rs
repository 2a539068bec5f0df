//! Tracking statistics.

use crate::util::size::ByteSize;

/// Point-in-time counters of a [`TrackingShim`](crate::TrackingShim).
///
/// Everything except `failed_allocs` is read under the registry lock, so the
/// fields are consistent with each other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerStats {
    /// Live allocations with a registry record.
    pub live_entries: usize,

    /// Bytes held by live allocations with a registry record.
    pub live_bytes: usize,

    /// Highest `live_bytes` seen (high water mark).
    pub peak_live_bytes: usize,

    /// Successful allocations, tracked or not.
    pub total_allocs: u64,

    /// Release calls, matched or not.
    pub total_releases: u64,

    /// Allocations that succeeded while the registry was full.
    pub untracked_allocs: u64,

    /// Releases of addresses with no live record.
    pub untracked_releases: u64,

    /// Records dropped to make room under `FullPolicy::EvictOldest`.
    pub evictions: u64,

    /// Requests the underlying allocator refused.
    pub failed_allocs: u64,
}

impl TrackerStats {
    /// Whether the counters show any visibility gap in the live totals.
    pub fn has_gaps(&self) -> bool {
        self.untracked_allocs > 0 || self.evictions > 0
    }
}

impl std::fmt::Display for TrackerStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Heap Tracking Statistics:")?;
        writeln!(f, "  Live allocations:   {}", self.live_entries)?;
        writeln!(f, "  Live bytes:         {}", ByteSize(self.live_bytes))?;
        writeln!(f, "  Peak live bytes:    {}", ByteSize(self.peak_live_bytes))?;
        writeln!(f, "  Allocations:        {}", self.total_allocs)?;
        writeln!(f, "  Releases:           {}", self.total_releases)?;
        writeln!(f, "  Untracked allocs:   {}", self.untracked_allocs)?;
        writeln!(f, "  Untracked releases: {}", self.untracked_releases)?;
        writeln!(f, "  Evictions:          {}", self.evictions)?;
        writeln!(f, "  Failed allocs:      {}", self.failed_allocs)?;
        Ok(())
    }
}
