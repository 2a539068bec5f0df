//! Bounded wrapper around the process allocator.

use std::alloc::{alloc, dealloc, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::RawAllocator;

/// Bytes reserved in front of every block to remember its size.
const HEADER: usize = 16;

/// Alignment of every returned block.
const ALIGN: usize = 16;

/// Fill pattern for released memory in debug builds.
#[cfg(debug_assertions)]
const FREED_PATTERN: u8 = 0xDE;

/// Process-allocator backed [`RawAllocator`] with an optional byte limit.
///
/// Each block carries a small header holding its size so `release` only
/// needs the address, the way a C `free` does. The limit counts requested
/// bytes and lets tests and host-side simulations reproduce a fixed-size
/// embedded arena running dry.
pub struct SystemHeap {
    /// Byte limit (None = unlimited)
    limit: Option<usize>,

    /// Requested bytes currently outstanding
    allocated_bytes: AtomicUsize,

    /// Blocks currently outstanding
    live_blocks: AtomicUsize,

    /// Total successful allocations
    allocation_count: AtomicUsize,
}

impl SystemHeap {
    /// Create an unlimited heap.
    pub const fn new() -> Self {
        Self {
            limit: None,
            allocated_bytes: AtomicUsize::new(0),
            live_blocks: AtomicUsize::new(0),
            allocation_count: AtomicUsize::new(0),
        }
    }

    /// Create a heap that refuses requests once `limit` bytes are outstanding.
    pub const fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            allocated_bytes: AtomicUsize::new(0),
            live_blocks: AtomicUsize::new(0),
            allocation_count: AtomicUsize::new(0),
        }
    }

    /// Configured byte limit, if any.
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Requested bytes currently outstanding.
    pub fn allocated_bytes(&self) -> usize {
        self.allocated_bytes.load(Ordering::Relaxed)
    }

    /// Blocks currently outstanding.
    pub fn live_blocks(&self) -> usize {
        self.live_blocks.load(Ordering::Relaxed)
    }

    /// Total successful allocations since creation.
    pub fn allocation_count(&self) -> usize {
        self.allocation_count.load(Ordering::Relaxed)
    }

    fn reserve(&self, size: usize) -> bool {
        match self.limit {
            None => {
                self.allocated_bytes.fetch_add(size, Ordering::Relaxed);
                true
            }
            Some(limit) => self
                .allocated_bytes
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                    current.checked_add(size).filter(|&total| total <= limit)
                })
                .is_ok(),
        }
    }

    fn unreserve(&self, size: usize) {
        self.allocated_bytes.fetch_sub(size, Ordering::Relaxed);
    }
}

impl Default for SystemHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl RawAllocator for SystemHeap {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        if !self.reserve(size) {
            return None;
        }

        let layout = match size
            .checked_add(HEADER)
            .and_then(|total| Layout::from_size_align(total, ALIGN).ok())
        {
            Some(layout) => layout,
            None => {
                self.unreserve(size);
                return None;
            }
        };

        // SAFETY: layout is never zero-sized (it always includes the header)
        let base = match NonNull::new(unsafe { alloc(layout) }) {
            Some(base) => base,
            None => {
                self.unreserve(size);
                return None;
            }
        };

        // SAFETY: the block is at least HEADER bytes and ALIGN-aligned,
        // which satisfies usize alignment; the user pointer stays in bounds.
        let user = unsafe {
            base.as_ptr().cast::<usize>().write(size);
            NonNull::new_unchecked(base.as_ptr().add(HEADER))
        };

        self.live_blocks.fetch_add(1, Ordering::Relaxed);
        self.allocation_count.fetch_add(1, Ordering::Relaxed);
        Some(user)
    }

    unsafe fn release(&self, ptr: NonNull<u8>) {
        let base = ptr.as_ptr().sub(HEADER);
        let size = base.cast::<usize>().read();

        #[cfg(debug_assertions)]
        std::ptr::write_bytes(ptr.as_ptr(), FREED_PATTERN, size);

        // SAFETY: this exact layout was validated in `allocate`
        dealloc(base, Layout::from_size_align_unchecked(size + HEADER, ALIGN));

        self.unreserve(size);
        self.live_blocks.fetch_sub(1, Ordering::Relaxed);
    }
}
