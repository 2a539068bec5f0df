//! The tracking shim.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::allocators::RawAllocator;
use crate::api::config::{FullPolicy, TrackerConfig};
use crate::api::error::AllocError;
use crate::api::site::Site;
use crate::api::stats::TrackerStats;
use crate::core::registry::{AllocationRecord, Registry};
use crate::diagnostics::emit::emit;
use crate::diagnostics::hooks::{self, HookGuard, OomHooks, OutOfMemory};
use crate::diagnostics::kind::{HW001, HW101, HW102, HW201, HW202};
use crate::diagnostics::report::{HeapReport, Report, SiteTable};
use crate::diagnostics::sink::{DiagnosticSink, StderrSink};
use crate::diagnostics::strict::StrictMode;
use crate::sync::atomics::AtomicCounter;
use crate::sync::mutex::Mutex;

/// Registry plus the counters that must move with it.
struct TrackerState {
    registry: Registry,
    next_sequence: u64,
    peak_live_bytes: usize,
    total_allocs: u64,
    total_releases: u64,
    untracked_allocs: u64,
    untracked_releases: u64,
    evictions: u64,
}

impl TrackerState {
    fn new(capacity: usize) -> Self {
        Self {
            registry: Registry::with_capacity(capacity),
            next_sequence: 0,
            peak_live_bytes: 0,
            total_allocs: 0,
            total_releases: 0,
            untracked_allocs: 0,
            untracked_releases: 0,
            evictions: 0,
        }
    }

    fn stats(&self, failed_allocs: u64) -> TrackerStats {
        TrackerStats {
            live_entries: self.registry.len(),
            live_bytes: self.registry.live_bytes(),
            peak_live_bytes: self.peak_live_bytes,
            total_allocs: self.total_allocs,
            total_releases: self.total_releases,
            untracked_allocs: self.untracked_allocs,
            untracked_releases: self.untracked_releases,
            evictions: self.evictions,
            failed_allocs,
        }
    }
}

/// What happened to a successful allocation's record.
enum TrackOutcome {
    Tracked,
    Untracked,
    Evicted(AllocationRecord),
    Replaced(AllocationRecord),
}

/// Allocation tracking layer around a [`RawAllocator`].
///
/// Every successful allocation gets a registry record (size, call-site,
/// sequence number) until it is released. The shim never changes whether an
/// allocation succeeds: a full registry only costs visibility, and releases
/// are forwarded even when no record matches.
///
/// The registry lock is held only for table updates and report traversal,
/// never across a call into the wrapped allocator. Share a shim between
/// tasks with `Arc` or a `static`.
///
/// # Example
///
/// ```rust
/// use heapwatch::{SystemHeap, TrackerConfig, TrackingShim};
///
/// let shim = TrackingShim::new(SystemHeap::new(), TrackerConfig::default());
///
/// let block = shim.allocate(256).unwrap();
/// assert_eq!(shim.stats().live_bytes, 256);
///
/// unsafe { shim.release(block) };
/// assert_eq!(shim.stats().live_entries, 0);
/// ```
pub struct TrackingShim<A: RawAllocator> {
    inner: A,
    config: TrackerConfig,
    state: Mutex<TrackerState>,
    failed_allocs: AtomicCounter,
    sink: Box<dyn DiagnosticSink>,
    oom: OomHooks,
    full_reported: AtomicBool,
}

impl<A: RawAllocator> TrackingShim<A> {
    /// Wrap `inner`, writing reports to stderr.
    pub fn new(inner: A, config: TrackerConfig) -> Self {
        Self::with_sink(inner, config, StderrSink)
    }

    /// Wrap `inner`, writing reports to `sink`.
    pub fn with_sink<S>(inner: A, config: TrackerConfig, sink: S) -> Self
    where
        S: DiagnosticSink + 'static,
    {
        Self {
            state: Mutex::new(TrackerState::new(config.registry_capacity)),
            inner,
            config,
            failed_allocs: AtomicCounter::default(),
            sink: Box::new(sink),
            oom: OomHooks::default(),
            full_reported: AtomicBool::new(false),
        }
    }

    /// The wrapped allocator.
    pub fn inner(&self) -> &A {
        &self.inner
    }

    /// The configuration this shim was built with.
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Allocate `size` bytes, attributed to the caller's source location.
    ///
    /// Zero-byte requests are treated as one byte.
    #[track_caller]
    pub fn allocate(&self, size: usize) -> Result<NonNull<u8>, AllocError> {
        self.allocate_at(size, Site::caller())
    }

    /// Allocate `size` bytes, attributed to `site`.
    pub fn allocate_at(&self, size: usize, site: Site) -> Result<NonNull<u8>, AllocError> {
        let size = size.max(1);

        let ptr = match self.inner.allocate(size) {
            Some(ptr) => ptr,
            None => return Err(self.on_failure(size, site)),
        };

        let address = ptr.as_ptr() as usize;
        match self.track(address, size, site) {
            TrackOutcome::Tracked => {}
            TrackOutcome::Untracked => {
                if !self.full_reported.swap(true, Ordering::Relaxed) {
                    emit(
                        &HW101,
                        format_args!(
                            "capacity {}, {} byte block from {} left untracked",
                            self.config.registry_capacity, size, site
                        ),
                        self.config.strict,
                    );
                }
            }
            TrackOutcome::Evicted(evicted) => {
                if !self.full_reported.swap(true, Ordering::Relaxed) {
                    emit(
                        &HW102,
                        format_args!(
                            "capacity {}, stopped tracking {} byte block from {} (seq {})",
                            self.config.registry_capacity,
                            evicted.size,
                            evicted.site,
                            evicted.sequence
                        ),
                        self.config.strict,
                    );
                }
            }
            TrackOutcome::Replaced(previous) => {
                emit(
                    &HW202,
                    format_args!(
                        "address {:#x} handed out at {} while still live from {}",
                        address, site, previous.site
                    ),
                    self.config.strict,
                );
            }
        }

        Ok(ptr)
    }

    /// Record a successful allocation.
    fn track(&self, address: usize, size: usize, site: Site) -> TrackOutcome {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        state.total_allocs += 1;
        let record = AllocationRecord {
            address,
            size,
            site,
            sequence: state.next_sequence,
        };
        state.next_sequence += 1;

        let outcome = match state.registry.insert(record) {
            Ok(None) => TrackOutcome::Tracked,
            Ok(Some(previous)) => TrackOutcome::Replaced(previous),
            Err(full) => match self.config.full_policy {
                FullPolicy::Degrade => {
                    state.untracked_allocs += 1;
                    TrackOutcome::Untracked
                }
                FullPolicy::EvictOldest => match state.registry.evict_oldest() {
                    Some(evicted) => {
                        state.evictions += 1;
                        match state.registry.insert(full.record) {
                            Ok(_) => TrackOutcome::Evicted(evicted),
                            Err(_) => {
                                state.untracked_allocs += 1;
                                TrackOutcome::Untracked
                            }
                        }
                    }
                    // Zero capacity: nothing to evict.
                    None => {
                        state.untracked_allocs += 1;
                        TrackOutcome::Untracked
                    }
                },
            },
        };

        state.peak_live_bytes = state.peak_live_bytes.max(state.registry.live_bytes());
        outcome
    }

    /// Run the failure hook and build the error for the caller.
    fn on_failure(&self, size: usize, site: Site) -> AllocError {
        let failures = self.failed_allocs.increment();
        let event = OutOfMemory {
            size,
            site: if site.is_unknown() { None } else { Some(site) },
        };

        // A handler that allocates through this shim and fails again must
        // not recurse into the hook.
        if let Some(_guard) = HookGuard::enter() {
            if self.config.dump_on_failure {
                let report: HeapReport = self.heap_report();
                hooks::write_failure_dump(&event, &report, &*self.sink);
            }
            self.oom.notify(&event);
        }

        // The failure is the caller's to handle; strict mode never turns it
        // into a panic.
        emit(
            &HW001,
            format_args!("{} bytes requested at {} (failure #{})", size, site, failures),
            StrictMode::Off,
        );

        AllocError { size, site }
    }

    // =========================================================================
    // Release
    // =========================================================================

    /// Release a block and drop its record.
    ///
    /// The release is forwarded to the wrapped allocator even when no record
    /// matches; the miss is counted in `untracked_releases`.
    ///
    /// # Safety
    ///
    /// Same contract as [`RawAllocator::release`] on the wrapped allocator:
    /// `ptr` must come from this shim's `allocate` and not be released twice.
    #[track_caller]
    pub unsafe fn release(&self, ptr: NonNull<u8>) {
        let address = ptr.as_ptr() as usize;
        let site = Site::caller();

        let removed = {
            let mut state = self.state.lock();
            state.total_releases += 1;
            let removed = state.registry.remove(address);
            if removed.is_none() {
                state.untracked_releases += 1;
            }
            removed
        };

        self.inner.release(ptr);

        if removed.is_none() {
            emit(
                &HW201,
                format_args!("address {:#x} released at {}", address, site),
                self.config.strict,
            );
        }
    }

    // =========================================================================
    // Reporting
    // =========================================================================

    /// Current counters.
    pub fn stats(&self) -> TrackerStats {
        let state = self.state.lock();
        state.stats(self.failed_allocs.get())
    }

    /// Counters plus the `N` oldest live records.
    pub fn snapshot<const N: usize>(&self) -> Report<N> {
        let state = self.state.lock();
        Report::build(state.stats(self.failed_allocs.get()), &state.registry)
    }

    /// Live records grouped by call-site, heaviest first.
    pub fn aggregate_by_site<const M: usize>(&self) -> SiteTable<M> {
        let state = self.state.lock();
        SiteTable::build(&state.registry)
    }

    /// Snapshot and site table from one consistent registry state.
    pub fn heap_report<const N: usize, const M: usize>(&self) -> HeapReport<N, M> {
        let state = self.state.lock();
        HeapReport::build(state.stats(self.failed_allocs.get()), &state.registry)
    }

    /// Write the heap report to the configured sink.
    pub fn print_report(&self) {
        self.report_to(&*self.sink);
    }

    /// Write the heap report to `sink`.
    ///
    /// The registry lock is released before anything is written.
    pub fn report_to(&self, sink: &dyn DiagnosticSink) {
        let report: HeapReport = self.heap_report();
        report.write_to(sink);
    }

    /// Visit every live record while holding the registry lock.
    ///
    /// `visit` must not call back into this shim.
    pub fn for_each_live<F>(&self, mut visit: F)
    where
        F: FnMut(&AllocationRecord),
    {
        let state = self.state.lock();
        state.registry.iter().for_each(|record| visit(record));
    }

    /// Write one line per live record and return how many there were.
    ///
    /// Meant for shutdown or the end of a test, when every live record is a
    /// leak.
    pub fn leak_report(&self, sink: &dyn DiagnosticSink) -> usize {
        let mut leaks = 0;
        let mut bytes = 0;
        self.for_each_live(|record| {
            leaks += 1;
            bytes += record.size;
            sink.write_line(format_args!(
                "leak: {} seq={} size={} addr={:#x}",
                record.site, record.sequence, record.size, record.address
            ));
        });
        sink.write_line(format_args!("leaks={} bytes={}", leaks, bytes));
        leaks
    }

    // =========================================================================
    // Out-of-memory notification
    // =========================================================================

    /// Register the out-of-memory callback, replacing any previous one.
    ///
    /// It runs synchronously on the failing task, after the failure dump,
    /// exactly once per refused request.
    pub fn set_oom_handler<F>(&self, handler: F)
    where
        F: Fn(&OutOfMemory) + Send + Sync + 'static,
    {
        self.oom.set(handler);
    }

    /// Remove the out-of-memory callback.
    pub fn clear_oom_handler(&self) {
        self.oom.clear();
    }
}

impl<A: RawAllocator> RawAllocator for TrackingShim<A> {
    #[track_caller]
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        self.allocate_at(size, Site::caller()).ok()
    }

    #[track_caller]
    unsafe fn release(&self, ptr: NonNull<u8>) {
        TrackingShim::release(self, ptr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocators::SystemHeap;
    use crate::diagnostics::sink::CollectingSink;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    const A: Site = Site::new("task_a.rs", 10);
    const B: Site = Site::new("task_b.rs", 20);

    fn shim(capacity: usize) -> TrackingShim<SystemHeap> {
        TrackingShim::with_sink(
            SystemHeap::new(),
            TrackerConfig::default().with_capacity(capacity),
            CollectingSink::new(),
        )
    }

    #[test]
    fn test_three_allocations_from_one_site() {
        let shim = shim(16);

        let blocks: Vec<_> = (0..3).map(|_| shim.allocate_at(256, A).unwrap()).collect();

        let report: Report = shim.snapshot();
        assert_eq!(report.live_entries(), 3);
        assert_eq!(report.live_bytes(), 768);

        let sites: SiteTable = shim.aggregate_by_site();
        let top = sites.top().unwrap();
        assert_eq!((top.site, top.count, top.total_bytes), (A, 3, 768));

        unsafe { shim.release(blocks[0]) };
        let stats = shim.stats();
        assert_eq!(stats.live_entries, 2);
        assert_eq!(stats.live_bytes, 512);
        assert_eq!(stats.peak_live_bytes, 768);

        for block in &blocks[1..] {
            unsafe { shim.release(*block) };
        }
        assert_eq!(shim.inner().live_blocks(), 0);
    }

    #[test]
    fn test_allocate_then_release_is_neutral() {
        let shim = shim(16);
        let keep = shim.allocate_at(32, B).unwrap();
        let before = shim.stats();

        let block = shim.allocate(100).unwrap();
        unsafe { shim.release(block) };

        let after = shim.stats();
        assert_eq!(after.live_entries, before.live_entries);
        assert_eq!(after.live_bytes, before.live_bytes);

        unsafe { shim.release(keep) };
    }

    #[test]
    fn test_caller_site_is_recorded() {
        let shim = shim(4);
        let line = line!() + 1;
        let block = shim.allocate(8).unwrap();

        let mut seen = None;
        shim.for_each_live(|record| seen = Some(record.site));
        let site = seen.unwrap();
        assert_eq!(site.line(), line);
        assert!(site.file().ends_with("shim.rs"));

        unsafe { shim.release(block) };
    }

    #[test]
    fn test_zero_size_is_rounded_up() {
        let shim = shim(4);
        let block = shim.allocate_at(0, A).unwrap();
        assert_eq!(shim.stats().live_bytes, 1);
        unsafe { shim.release(block) };
    }

    #[test]
    fn test_full_registry_degrades() {
        let shim = shim(2);

        let a = shim.allocate_at(10, A).unwrap();
        let b = shim.allocate_at(20, A).unwrap();
        let c = shim.allocate_at(30, B).unwrap();

        let stats = shim.stats();
        assert_eq!(stats.live_entries, 2);
        assert_eq!(stats.live_bytes, 30);
        assert_eq!(stats.untracked_allocs, 1);
        assert_eq!(shim.inner().live_blocks(), 3);

        // The untracked block is still released to the heap.
        unsafe { shim.release(c) };
        let stats = shim.stats();
        assert_eq!(stats.untracked_releases, 1);
        assert_eq!(stats.live_entries, 2);
        assert_eq!(shim.inner().live_blocks(), 2);

        unsafe {
            shim.release(a);
            shim.release(b);
        }
    }

    #[test]
    fn test_full_registry_evicts_oldest() {
        let shim = TrackingShim::with_sink(
            SystemHeap::new(),
            TrackerConfig::default()
                .with_capacity(2)
                .with_full_policy(FullPolicy::EvictOldest),
            CollectingSink::new(),
        );

        let a = shim.allocate_at(10, A).unwrap();
        let b = shim.allocate_at(20, A).unwrap();
        let c = shim.allocate_at(30, B).unwrap();

        let stats = shim.stats();
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.untracked_allocs, 0);
        assert_eq!(stats.live_bytes, 50);

        let report: Report<4> = shim.snapshot();
        let sizes: Vec<usize> = report.oldest().map(|r| r.size).collect();
        assert_eq!(sizes, vec![20, 30]);

        unsafe {
            shim.release(a);
            shim.release(b);
            shim.release(c);
        }
        assert_eq!(shim.stats().untracked_releases, 1);
    }

    #[test]
    fn test_failure_dumps_report_and_notifies_once() {
        let sink = Arc::new(CollectingSink::new());
        let shim = TrackingShim::with_sink(
            SystemHeap::with_limit(300),
            TrackerConfig::default(),
            sink.clone(),
        );

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        shim.set_oom_handler(move |event| {
            assert_eq!(event.size, 200);
            assert_eq!(event.site, Some(B));
            calls_clone.fetch_add(1, Ordering::Relaxed);
        });

        let held = shim.allocate_at(256, A).unwrap();
        let err = shim.allocate_at(200, B).unwrap_err();

        assert_eq!(err, AllocError { size: 200, site: B });
        assert_eq!(calls.load(Ordering::Relaxed), 1);

        let stats = shim.stats();
        assert_eq!(stats.failed_allocs, 1);
        assert_eq!(stats.live_entries, 1);

        let lines = sink.lines();
        assert_eq!(lines[0], "out of memory: requested=200 bytes site=task_b.rs:20");
        assert_eq!(lines[1], "task_a.rs:10 : 1 allocations, 256 bytes");
        assert_eq!(lines[2], "live=1 bytes=256 untracked_allocs=0 untracked_frees=0");
        assert!(lines[3].starts_with("oldest: seq=0 "));

        unsafe { shim.release(held) };
    }

    #[test]
    fn test_failure_without_dump() {
        let sink = Arc::new(CollectingSink::new());
        let shim = TrackingShim::with_sink(
            SystemHeap::with_limit(0),
            TrackerConfig::default().with_dump_on_failure(false),
            sink.clone(),
        );

        assert!(shim.allocate(1).is_err());
        assert!(sink.lines().is_empty());
        assert_eq!(shim.stats().failed_allocs, 1);
    }

    #[test]
    fn test_handler_that_allocates_does_not_recurse() {
        let shim = Arc::new(TrackingShim::with_sink(
            SystemHeap::with_limit(0),
            TrackerConfig::default(),
            CollectingSink::new(),
        ));

        let calls = Arc::new(AtomicUsize::new(0));
        let inner_shim = Arc::downgrade(&shim);
        let calls_clone = calls.clone();
        shim.set_oom_handler(move |_event| {
            calls_clone.fetch_add(1, Ordering::Relaxed);
            if let Some(shim) = inner_shim.upgrade() {
                assert!(shim.allocate_at(8, B).is_err());
            }
        });

        assert!(shim.allocate_at(8, A).is_err());
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(shim.stats().failed_allocs, 2);
    }

    #[test]
    fn test_leak_report_lists_live_records() {
        let sink = CollectingSink::new();
        let shim = shim(8);

        let a = shim.allocate_at(64, A).unwrap();
        let b = shim.allocate_at(16, B).unwrap();
        unsafe { shim.release(a) };

        assert_eq!(shim.leak_report(&sink), 1);
        let lines = sink.lines();
        assert!(lines[0].starts_with("leak: task_b.rs:20 seq=1 size=16 addr=0x"));
        assert_eq!(lines[1], "leaks=1 bytes=16");

        unsafe { shim.release(b) };
    }

    #[test]
    fn test_strict_mode_still_returns_allocation_failure() {
        let shim = TrackingShim::with_sink(
            SystemHeap::with_limit(0),
            TrackerConfig::default().with_strict(StrictMode::PanicOnWarning),
            CollectingSink::new(),
        );

        let err = shim.allocate_at(8, A).unwrap_err();
        assert_eq!(err, AllocError { size: 8, site: A });
        assert_eq!(shim.stats().failed_allocs, 1);
    }

    #[test]
    #[should_panic(expected = "HW101")]
    fn test_strict_warning_panics_on_full_registry() {
        let shim = TrackingShim::with_sink(
            SystemHeap::new(),
            TrackerConfig::default()
                .with_capacity(0)
                .with_strict(StrictMode::PanicOnWarning),
            CollectingSink::new(),
        );
        let _ = shim.allocate(8);
    }

    #[test]
    fn test_shim_through_trait_object() {
        let shim = shim(4);
        let raw: &dyn RawAllocator = &shim;

        let block = raw.allocate(48).unwrap();
        assert_eq!(shim.stats().live_bytes, 48);

        unsafe { raw.release(block) };
        assert_eq!(shim.stats().live_entries, 0);
        assert_eq!(shim.stats().untracked_releases, 0);
    }
}
