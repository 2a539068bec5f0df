//! Point-in-time heap reports.
//!
//! Reports are plain values with fixed-size storage: building one never
//! allocates, so a report can be produced from the out-of-memory path
//! itself. They are built from a borrowed [`Registry`] while the caller
//! holds the registry lock.

use crate::api::site::Site;
use crate::api::stats::TrackerStats;
use crate::core::registry::{AllocationRecord, Registry};

use super::sink::DiagnosticSink;

/// Oldest records kept in a [`Report`] unless specified otherwise.
pub const DEFAULT_OLDEST: usize = 8;

/// Distinct sites kept in a [`SiteTable`] unless specified otherwise.
pub const DEFAULT_SITES: usize = 16;

/// Counters plus the `N` longest-outstanding allocations.
///
/// In a system whose buffers are short-lived, the oldest live records are
/// the most likely leaks.
#[derive(Debug, Clone, Copy)]
pub struct Report<const N: usize = DEFAULT_OLDEST> {
    /// Counters at the time of the snapshot.
    pub stats: TrackerStats,
    oldest: [Option<AllocationRecord>; N],
    oldest_len: usize,
}

impl<const N: usize> Report<N> {
    pub(crate) fn build(stats: TrackerStats, registry: &Registry) -> Self {
        let mut report = Self {
            stats,
            oldest: [None; N],
            oldest_len: 0,
        };
        for record in registry.iter() {
            report.offer(*record);
        }
        report
    }

    /// Keep `record` if it is among the `N` lowest sequence numbers so far.
    fn offer(&mut self, record: AllocationRecord) {
        let pos = self.oldest[..self.oldest_len]
            .iter()
            .flatten()
            .position(|kept| kept.sequence > record.sequence)
            .unwrap_or(self.oldest_len);
        if pos >= N {
            return;
        }

        let last = self.oldest_len.min(N - 1);
        for i in (pos + 1..=last).rev() {
            self.oldest[i] = self.oldest[i - 1];
        }
        self.oldest[pos] = Some(record);
        self.oldest_len = (self.oldest_len + 1).min(N);
    }

    /// Oldest live records, lowest sequence first.
    pub fn oldest(&self) -> impl Iterator<Item = &AllocationRecord> + '_ {
        self.oldest[..self.oldest_len].iter().flatten()
    }

    /// Live allocations with a registry record.
    pub fn live_entries(&self) -> usize {
        self.stats.live_entries
    }

    /// Bytes held by tracked live allocations.
    pub fn live_bytes(&self) -> usize {
        self.stats.live_bytes
    }

    /// Allocations that could not be tracked.
    pub fn untracked_allocs(&self) -> u64 {
        self.stats.untracked_allocs
    }

    /// Releases with no matching record.
    pub fn untracked_releases(&self) -> u64 {
        self.stats.untracked_releases
    }

    /// Write the one-line summary.
    pub fn write_summary(&self, sink: &dyn DiagnosticSink) {
        sink.write_line(format_args!(
            "live={} bytes={} untracked_allocs={} untracked_frees={}",
            self.stats.live_entries,
            self.stats.live_bytes,
            self.stats.untracked_allocs,
            self.stats.untracked_releases
        ));
    }

    /// Write one line per oldest record.
    pub fn write_oldest(&self, sink: &dyn DiagnosticSink) {
        for record in self.oldest() {
            sink.write_line(format_args!(
                "oldest: seq={} addr={:#x} size={} site={}",
                record.sequence, record.address, record.size, record.site
            ));
        }
    }
}

/// Live usage attributed to one call-site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiteUsage {
    /// The call-site.
    pub site: Site,

    /// Live allocations from this site.
    pub count: usize,

    /// Bytes held by those allocations.
    pub total_bytes: usize,
}

impl SiteUsage {
    const EMPTY: SiteUsage = SiteUsage {
        site: Site::UNKNOWN,
        count: 0,
        total_bytes: 0,
    };
}

/// Live records grouped by call-site, heaviest first.
///
/// Holds the `M` sites with the most live bytes. Records from the remaining
/// sites are folded into [`unlisted_records`](Self::unlisted_records) and
/// [`unlisted_bytes`](Self::unlisted_bytes) so the totals still add up.
#[derive(Debug, Clone, Copy)]
pub struct SiteTable<const M: usize = DEFAULT_SITES> {
    entries: [SiteUsage; M],
    len: usize,
    unlisted_records: usize,
    unlisted_bytes: usize,
}

impl<const M: usize> SiteTable<M> {
    pub(crate) fn build(registry: &Registry) -> Self {
        let mut table = Self {
            entries: [SiteUsage::EMPTY; M],
            len: 0,
            unlisted_records: 0,
            unlisted_bytes: 0,
        };
        for (index, record) in registry.iter().enumerate() {
            if let Some(usage) = site_totals(registry, index, record.site) {
                table.offer(usage);
            }
        }

        let (listed_records, listed_bytes) = table
            .iter()
            .fold((0, 0), |(count, bytes), u| (count + u.count, bytes + u.total_bytes));
        table.unlisted_records = registry.len() - listed_records;
        table.unlisted_bytes = registry.live_bytes() - listed_bytes;
        table
    }

    /// Keep `usage` if it ranks among the `M` heaviest sites so far.
    fn offer(&mut self, usage: SiteUsage) {
        let pos = self.entries[..self.len]
            .iter()
            .position(|kept| {
                usage.total_bytes > kept.total_bytes
                    || (usage.total_bytes == kept.total_bytes && usage.site < kept.site)
            })
            .unwrap_or(self.len);
        if pos >= M {
            return;
        }

        let last = self.len.min(M - 1);
        for i in (pos + 1..=last).rev() {
            self.entries[i] = self.entries[i - 1];
        }
        self.entries[pos] = usage;
        self.len = (self.len + 1).min(M);
    }

    /// Sites in report order: descending bytes, then ascending site.
    pub fn as_slice(&self) -> &[SiteUsage] {
        &self.entries[..self.len]
    }

    /// Iterate in report order.
    pub fn iter(&self) -> std::slice::Iter<'_, SiteUsage> {
        self.as_slice().iter()
    }

    /// Number of listed sites.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no site is listed.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The site holding the most bytes.
    pub fn top(&self) -> Option<&SiteUsage> {
        self.as_slice().first()
    }

    /// Usage for a specific site, if listed.
    pub fn get(&self, site: &Site) -> Option<&SiteUsage> {
        self.iter().find(|usage| usage.site == *site)
    }

    /// Records whose site did not fit in the table.
    pub fn unlisted_records(&self) -> usize {
        self.unlisted_records
    }

    /// Bytes of records whose site did not fit in the table.
    pub fn unlisted_bytes(&self) -> usize {
        self.unlisted_bytes
    }

    /// Write one line per site.
    pub fn write_to(&self, sink: &dyn DiagnosticSink) {
        for usage in self.iter() {
            sink.write_line(format_args!(
                "{} : {} allocations, {} bytes",
                usage.site, usage.count, usage.total_bytes
            ));
        }
        if self.unlisted_records > 0 {
            sink.write_line(format_args!(
                "<other sites> : {} allocations, {} bytes",
                self.unlisted_records, self.unlisted_bytes
            ));
        }
    }
}

/// Totals for `site`, or `None` if a record before `index` (in table
/// order) already belongs to it.
fn site_totals(registry: &Registry, index: usize, site: Site) -> Option<SiteUsage> {
    let mut usage = SiteUsage {
        site,
        count: 0,
        total_bytes: 0,
    };
    for (other_index, other) in registry.iter().enumerate() {
        if other.site != site {
            continue;
        }
        if other_index < index {
            return None;
        }
        usage.count += 1;
        usage.total_bytes += other.size;
    }
    Some(usage)
}

/// A [`Report`] and a [`SiteTable`] taken from the same registry state.
#[derive(Debug, Clone, Copy)]
pub struct HeapReport<const N: usize = DEFAULT_OLDEST, const M: usize = DEFAULT_SITES> {
    /// Counters and oldest records.
    pub report: Report<N>,

    /// Per-site aggregation.
    pub sites: SiteTable<M>,
}

impl<const N: usize, const M: usize> HeapReport<N, M> {
    pub(crate) fn build(stats: TrackerStats, registry: &Registry) -> Self {
        Self {
            report: Report::build(stats, registry),
            sites: SiteTable::build(registry),
        }
    }

    /// Write the standard report text: one line per site, then the summary.
    pub fn write_to(&self, sink: &dyn DiagnosticSink) {
        self.sites.write_to(sink);
        self.report.write_summary(sink);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::sink::CollectingSink;

    fn registry_with(records: &[(usize, usize, Site, u64)]) -> Registry {
        let mut registry = Registry::with_capacity(64);
        for &(address, size, site, sequence) in records {
            registry
                .insert(AllocationRecord {
                    address,
                    size,
                    site,
                    sequence,
                })
                .unwrap();
        }
        registry
    }

    const A: Site = Site::new("a.rs", 1);
    const B: Site = Site::new("b.rs", 2);
    const C: Site = Site::new("c.rs", 3);

    #[test]
    fn test_oldest_keeps_lowest_sequences_in_order() {
        let registry = registry_with(&[
            (0x10, 8, A, 9),
            (0x20, 8, A, 2),
            (0x30, 8, B, 7),
            (0x40, 8, B, 4),
            (0x50, 8, C, 1),
        ]);

        let report: Report<3> = Report::build(TrackerStats::default(), &registry);
        let sequences: Vec<u64> = report.oldest().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 4]);
    }

    #[test]
    fn test_oldest_with_fewer_records_than_slots() {
        let registry = registry_with(&[(0x10, 8, A, 5), (0x20, 8, A, 3)]);

        let report: Report = Report::build(TrackerStats::default(), &registry);
        let sequences: Vec<u64> = report.oldest().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![3, 5]);

        let empty: Report<0> = Report::build(TrackerStats::default(), &registry);
        assert_eq!(empty.oldest().count(), 0);
    }

    #[test]
    fn test_sites_sorted_by_bytes_then_site() {
        let registry = registry_with(&[
            (0x10, 100, C, 0),
            (0x20, 50, A, 1),
            (0x30, 50, A, 2),
            (0x40, 100, B, 3),
            (0x50, 10, C, 4),
        ]);

        let table: SiteTable = SiteTable::build(&registry);
        let order: Vec<(Site, usize, usize)> = table
            .iter()
            .map(|u| (u.site, u.count, u.total_bytes))
            .collect();

        // A and B tie on 100 bytes; A sorts first.
        assert_eq!(order, vec![(C, 2, 110), (A, 2, 100), (B, 1, 100)]);
        assert_eq!(table.top().map(|u| u.site), Some(C));
    }

    #[test]
    fn test_sites_beyond_capacity_are_unlisted() {
        let registry = registry_with(&[(0x10, 4, A, 0), (0x20, 6, B, 1), (0x30, 8, C, 2)]);

        let table: SiteTable<2> = SiteTable::build(&registry);
        let listed: usize = table.iter().map(|u| u.total_bytes).sum();
        assert_eq!(table.len(), 2);
        assert_eq!(table.unlisted_records(), 1);
        assert_eq!(listed + table.unlisted_bytes(), 18);
    }

    #[test]
    fn test_heaviest_site_listed_past_capacity() {
        let mut registry = Registry::with_capacity(64);
        for line in 0..20u32 {
            registry
                .insert(AllocationRecord {
                    address: 0x1000 + line as usize * 0x10,
                    size: 8,
                    site: Site::new("light.rs", line),
                    sequence: line as u64,
                })
                .unwrap();
        }
        let heavy = Site::new("heavy.rs", 1);
        registry
            .insert(AllocationRecord {
                address: 0x9000,
                size: 100_000,
                site: heavy,
                sequence: 20,
            })
            .unwrap();

        let table: SiteTable = SiteTable::build(&registry);
        let top = table.top().unwrap();
        assert_eq!((top.site, top.count, top.total_bytes), (heavy, 1, 100_000));
        assert_eq!(table.len(), 16);

        // Equal weights fall back to site order, so the last lines are cut.
        let last = table.as_slice().last().unwrap();
        assert_eq!(last.site, Site::new("light.rs", 14));
        assert_eq!(table.unlisted_records(), 5);
        assert_eq!(table.unlisted_bytes(), 40);
    }

    #[test]
    fn test_split_site_counted_once() {
        let registry = registry_with(&[(0x10, 5, A, 0), (0x20, 7, B, 1), (0x30, 9, A, 2)]);

        let table: SiteTable<1> = SiteTable::build(&registry);
        let top = table.top().unwrap();
        assert_eq!((top.site, top.count, top.total_bytes), (A, 2, 14));
        assert_eq!(table.unlisted_records(), 1);
        assert_eq!(table.unlisted_bytes(), 7);
    }

    #[test]
    fn test_report_text_format() {
        let registry = registry_with(&[(0x10, 256, A, 0), (0x20, 256, A, 1), (0x30, 64, B, 2)]);
        let stats = TrackerStats {
            live_entries: registry.len(),
            live_bytes: registry.live_bytes(),
            untracked_allocs: 1,
            untracked_releases: 2,
            ..TrackerStats::default()
        };

        let sink = CollectingSink::new();
        let report: HeapReport = HeapReport::build(stats, &registry);
        report.write_to(&sink);

        assert_eq!(
            sink.lines(),
            vec![
                "a.rs:1 : 2 allocations, 512 bytes".to_string(),
                "b.rs:2 : 1 allocations, 64 bytes".to_string(),
                "live=3 bytes=576 untracked_allocs=1 untracked_frees=2".to_string(),
            ]
        );
    }
}
