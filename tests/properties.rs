//! Model-based checks of the shim's counters over random operation sequences.

use std::ptr::NonNull;

use heapwatch::{FullPolicy, NullSink, Report, Site, SiteTable, SystemHeap, TrackerConfig, TrackingShim};
use quickcheck::{Arbitrary, Gen, QuickCheck};

const CAPACITY: usize = 8;

const SITES: [Site; 3] = [
    Site::new("a.rs", 1),
    Site::new("b.rs", 2),
    Site::new("c.rs", 3),
];

#[derive(Debug, Clone)]
enum Op {
    Alloc { size: usize, site: usize },
    Release(usize),
    Report,
}

impl Arbitrary for Op {
    fn arbitrary(g: &mut Gen) -> Self {
        match u8::arbitrary(g) % 5 {
            0 | 1 => Op::Alloc {
                size: usize::arbitrary(g) % 512,
                site: usize::arbitrary(g) % SITES.len(),
            },
            2 | 3 => Op::Release(usize::arbitrary(g)),
            _ => Op::Report,
        }
    }
}

/// A block the model believes is live.
struct Live {
    ptr: NonNull<u8>,
    size: usize,
    tracked: bool,
}

fn run(ops: Vec<Op>, policy: FullPolicy) -> bool {
    let shim = TrackingShim::with_sink(
        SystemHeap::new(),
        TrackerConfig::default()
            .with_capacity(CAPACITY)
            .with_full_policy(policy),
        NullSink,
    );

    let mut live: Vec<Live> = Vec::new();
    let mut untracked_allocs = 0;
    let mut untracked_releases = 0;
    let mut ok = true;

    for op in ops {
        match op {
            Op::Alloc { size, site } => {
                let ptr = match shim.allocate_at(size, SITES[site]) {
                    Ok(ptr) => ptr,
                    Err(_) => return false,
                };
                let tracked_now = live.iter().filter(|l| l.tracked).count();
                let tracked = if tracked_now < CAPACITY {
                    true
                } else if policy == FullPolicy::EvictOldest {
                    if let Some(oldest) = live.iter_mut().find(|l| l.tracked) {
                        oldest.tracked = false;
                    }
                    true
                } else {
                    untracked_allocs += 1;
                    false
                };
                live.push(Live {
                    ptr,
                    size: size.max(1),
                    tracked,
                });
            }
            Op::Release(index) => {
                if live.is_empty() {
                    continue;
                }
                let block = live.remove(index % live.len());
                if !block.tracked {
                    untracked_releases += 1;
                }
                unsafe { shim.release(block.ptr) };
            }
            Op::Report => {
                let report: Report<4> = shim.snapshot();
                let sites: SiteTable<2> = shim.aggregate_by_site();
                let listed: usize = sites.iter().map(|u| u.total_bytes).sum();
                ok &= listed + sites.unlisted_bytes() == report.live_bytes();

                let sequences: Vec<u64> = report.oldest().map(|r| r.sequence).collect();
                ok &= sequences.windows(2).all(|w| w[0] < w[1]);
            }
        }

        let stats = shim.stats();
        let tracked: Vec<&Live> = live.iter().filter(|l| l.tracked).collect();
        ok &= stats.live_entries == tracked.len();
        ok &= stats.live_bytes == tracked.iter().map(|l| l.size).sum::<usize>();
        ok &= stats.live_entries <= CAPACITY;
        ok &= stats.untracked_allocs == untracked_allocs;
        ok &= stats.untracked_releases == untracked_releases;
        ok &= stats.peak_live_bytes >= stats.live_bytes;
        if !ok {
            break;
        }
    }

    for block in live {
        unsafe { shim.release(block.ptr) };
    }
    ok && shim.inner().live_blocks() == 0
}

fn prop_degrade_matches_model(ops: Vec<Op>) -> bool {
    run(ops, FullPolicy::Degrade)
}

fn prop_evict_matches_model(ops: Vec<Op>) -> bool {
    run(ops, FullPolicy::EvictOldest)
}

#[test]
fn quickcheck_degrade_matches_model() {
    QuickCheck::new()
        .gen(Gen::new(100))
        .tests(200)
        .quickcheck(prop_degrade_matches_model as fn(Vec<Op>) -> bool);
}

#[test]
fn quickcheck_evict_matches_model() {
    QuickCheck::new()
        .gen(Gen::new(100))
        .tests(200)
        .quickcheck(prop_evict_matches_model as fn(Vec<Op>) -> bool);
}
