//! Fixed-capacity table of live allocations.
//!
//! Open addressing with linear probing over a power-of-two slot array sized
//! to at least twice the record capacity, so a probe always meets an empty
//! slot. Removal shifts displaced entries back instead of leaving
//! tombstones, which keeps lookups bounded no matter how long the system
//! runs. All storage is reserved in [`Registry::with_capacity`]; nothing
//! afterwards allocates.

use std::hash::Hasher;

use fnv::FnvHasher;
use thiserror::Error;

use crate::api::site::Site;

/// Largest record capacity a [`Registry`] accepts; larger requests are
/// clamped.
pub const MAX_CAPACITY: usize = 1 << 24;

/// Metadata for one live allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationRecord {
    /// Block address handed out by the underlying allocator.
    pub address: usize,

    /// Requested size in bytes (always > 0).
    pub size: usize,

    /// Where the allocation was requested.
    pub site: Site,

    /// Insertion order; lower is older.
    pub sequence: u64,
}

/// Returned by [`Registry::insert`] when every record slot is taken.
///
/// Carries the rejected record back to the caller.
#[derive(Debug, Clone, Copy, Error)]
#[error("allocation registry is full ({capacity} live records)")]
pub struct RegistryFull {
    /// The record that did not fit.
    pub record: AllocationRecord,

    /// Configured record capacity.
    pub capacity: usize,
}

/// Mapping from live block address to its [`AllocationRecord`].
pub struct Registry {
    slots: Box<[Option<AllocationRecord>]>,
    mask: usize,
    capacity: usize,
    len: usize,
    live_bytes: usize,
}

impl Registry {
    /// Create a registry able to hold `capacity` live records.
    ///
    /// `capacity` is clamped to [`MAX_CAPACITY`].
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.min(MAX_CAPACITY);
        let buckets = bucket_count(capacity);
        Self {
            slots: vec![None; buckets].into_boxed_slice(),
            mask: buckets - 1,
            capacity,
            len: 0,
            live_bytes: 0,
        }
    }

    /// Maximum number of live records.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no records are live.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether another distinct address would be rejected.
    pub fn is_full(&self) -> bool {
        self.len >= self.capacity
    }

    /// Sum of the sizes of all live records.
    pub fn live_bytes(&self) -> usize {
        self.live_bytes
    }

    /// Insert a record.
    ///
    /// An address that is already present has its record replaced and the
    /// previous record is returned; the byte total is adjusted so nothing is
    /// counted twice.
    pub fn insert(
        &mut self,
        record: AllocationRecord,
    ) -> Result<Option<AllocationRecord>, RegistryFull> {
        let mut idx = self.home(record.address);
        loop {
            match self.slots[idx] {
                Some(existing) if existing.address == record.address => {
                    self.live_bytes = self.live_bytes - existing.size + record.size;
                    self.slots[idx] = Some(record);
                    return Ok(Some(existing));
                }
                Some(_) => idx = (idx + 1) & self.mask,
                None => break,
            }
        }

        if self.is_full() {
            return Err(RegistryFull {
                record,
                capacity: self.capacity,
            });
        }

        self.slots[idx] = Some(record);
        self.len += 1;
        self.live_bytes += record.size;
        Ok(None)
    }

    /// Look up the record for `address`.
    pub fn get(&self, address: usize) -> Option<&AllocationRecord> {
        self.find(address).and_then(|idx| self.slots[idx].as_ref())
    }

    /// Whether `address` has a live record.
    pub fn contains(&self, address: usize) -> bool {
        self.find(address).is_some()
    }

    /// Remove and return the record for `address`.
    pub fn remove(&mut self, address: usize) -> Option<AllocationRecord> {
        let idx = self.find(address)?;
        let removed = self.slots[idx].take()?;
        self.len -= 1;
        self.live_bytes -= removed.size;
        self.backshift(idx);
        Some(removed)
    }

    /// The record with the lowest sequence number.
    pub fn oldest(&self) -> Option<&AllocationRecord> {
        self.iter().min_by_key(|record| record.sequence)
    }

    /// Drop the record with the lowest sequence number from the table.
    pub fn evict_oldest(&mut self) -> Option<AllocationRecord> {
        let address = self.oldest()?.address;
        self.remove(address)
    }

    /// Iterate over live records in table order.
    pub fn iter(&self) -> impl Iterator<Item = &AllocationRecord> + '_ {
        self.slots.iter().flatten()
    }

    fn home(&self, address: usize) -> usize {
        let mut hasher = FnvHasher::default();
        hasher.write_usize(address);
        (hasher.finish() as usize) & self.mask
    }

    fn find(&self, address: usize) -> Option<usize> {
        let mut idx = self.home(address);
        loop {
            match &self.slots[idx] {
                None => return None,
                Some(record) if record.address == address => return Some(idx),
                Some(_) => idx = (idx + 1) & self.mask,
            }
        }
    }

    /// Close the gap at `hole` by pulling back entries whose probe chain
    /// crosses it.
    fn backshift(&mut self, mut hole: usize) {
        let mut next = (hole + 1) & self.mask;
        while let Some(record) = self.slots[next] {
            let home = self.home(record.address);
            // The entry may move into the hole only if the hole lies
            // cyclically within [home, next).
            let from_home = next.wrapping_sub(home) & self.mask;
            let from_hole = next.wrapping_sub(hole) & self.mask;
            if from_home >= from_hole {
                self.slots[hole] = self.slots[next].take();
                hole = next;
            }
            next = (next + 1) & self.mask;
        }
    }
}

/// Slot count for `capacity` records: a power of two, at least twice it.
fn bucket_count(capacity: usize) -> usize {
    capacity
        .min(MAX_CAPACITY)
        .max(1)
        .checked_mul(2)
        .and_then(usize::checked_next_power_of_two)
        .unwrap_or(2 * MAX_CAPACITY)
}
