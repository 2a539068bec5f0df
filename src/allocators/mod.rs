//! The allocator seam the tracking shim sits on.
//!
//! Anything that can hand out and take back blocks by address implements
//! [`RawAllocator`]: a board's arena allocator, the bundled [`SystemHeap`],
//! a test double, or another [`TrackingShim`](crate::TrackingShim).

use std::ptr::NonNull;
use std::sync::Arc;

pub mod heap;

pub use heap::SystemHeap;

/// Opaque allocate/release capability.
///
/// Implementations must be usable from any thread. They are never called
/// with the tracking registry locked.
pub trait RawAllocator: Send + Sync {
    /// Allocate a block of at least `size` bytes, or `None` when exhausted.
    fn allocate(&self, size: usize) -> Option<NonNull<u8>>;

    /// Return a block to the allocator.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by `allocate` on this allocator and not
    /// released since.
    unsafe fn release(&self, ptr: NonNull<u8>);
}

impl<A: RawAllocator + ?Sized> RawAllocator for &A {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        (**self).allocate(size)
    }

    unsafe fn release(&self, ptr: NonNull<u8>) {
        (**self).release(ptr)
    }
}

impl<A: RawAllocator + ?Sized> RawAllocator for Arc<A> {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        (**self).allocate(size)
    }

    unsafe fn release(&self, ptr: NonNull<u8>) {
        (**self).release(ptr)
    }
}
