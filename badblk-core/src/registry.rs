// vim: tw=80
//! Bad block interval registry
//!
//! Merges the bad block reports of every member of one array into a single
//! ordered set of intervals, each tagged with the members that reported it.
//! The intervals live in the array's member-relative address space.

use crate::{
    geometry::ArrayGeometry,
    member::MemberSource,
    types::*,
    util::round_down,
};
use fixedbitset::FixedBitSet;
use std::{
    collections::BTreeMap,
    fmt::{self, Display, Formatter},
    ops::Range,
};

/// A set of member indices, sized for one array
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct DiskSet(FixedBitSet);

impl DiskSet {
    /// An empty set able to hold members `0..disks`
    pub fn new(disks: usize) -> Self {
        DiskSet(FixedBitSet::with_capacity(disks))
    }

    pub fn single(disks: usize, disk: usize) -> Self {
        let mut s = Self::new(disks);
        s.insert(disk);
        s
    }

    /// # Panics
    ///
    /// If `disk` is beyond the set's capacity
    pub fn insert(&mut self, disk: usize) {
        self.0.insert(disk);
    }

    /// A copy of this set, with `disk` added
    pub fn with(&self, disk: usize) -> Self {
        let mut s = self.clone();
        s.insert(disk);
        s
    }

    pub fn contains(&self, disk: usize) -> bool {
        self.0.contains(disk)
    }

    /// Number of members in the set
    pub fn len(&self) -> usize {
        self.0.count_ones(..)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item=usize> + '_ {
        self.0.ones()
    }
}

impl Display for DiskSet {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str("{")?;
        for (i, disk) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{disk}")?;
        }
        f.write_str("}")
    }
}

/// A member-relative range, and the members that report it bad
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BadBlockInterval {
    pub start: SectorT,
    pub len: SectorT,
    pub disks: DiskSet,
}

impl BadBlockInterval {
    pub fn end(&self) -> SectorT {
        self.start + self.len
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct Entry {
    end: SectorT,
    disks: DiskSet,
}

/// Ordered, non-overlapping bad block intervals of one array.
///
/// Touching intervals always have different disk sets.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Registry {
    disks: usize,
    /// Indexed by starting sector
    intervals: BTreeMap<SectorT, Entry>,
}

impl Registry {
    pub fn new(disks: usize) -> Self {
        Registry{disks, intervals: BTreeMap::new()}
    }

    /// Build a registry from every member's reports
    pub fn from_members(geom: &ArrayGeometry, members: &[MemberSource])
        -> Self
    {
        let mut reg = Self::new(geom.disk_count as usize);
        for (disk, src) in members.iter().enumerate().take(reg.disks) {
            for r in src.ranges() {
                reg.add_report(disk, r.start, r.len);
            }
        }
        reg
    }

    /// Record that member `disk` reports `len` sectors at `start` as bad.
    ///
    /// The range is first widened to whole pages.
    pub fn add_report(&mut self, disk: usize, start: SectorT, len: SectorT) {
        if len == 0 {
            return;
        }
        let Some(e) = start.checked_add(len)
            .and_then(|e| e.checked_next_multiple_of(PAGE_SECTORS)) else {
            tracing::debug!("member {disk}: unaddressable range at {start}");
            return;
        };
        let s = round_down(start, PAGE_SECTORS);
        self.merge_or_split(disk, s, e - s);
    }

    /// Record a range exactly as given.
    ///
    /// Existing intervals that overlap it are split, so that the overlapping
    /// parts gain `disk` while the rest keep their old disk sets.  Parts of
    /// the new range that overlap nothing become new intervals.  A range that
    /// runs past the last sector is clipped there.
    ///
    /// # Panics
    ///
    /// If `disk` is beyond the array's member count
    pub fn merge_or_split(&mut self, disk: usize, start: SectorT, len: SectorT)
    {
        assert!(disk < self.disks, "member {disk} out of range");
        if len == 0 {
            return;
        }
        let end = start.saturating_add(len);
        let single = DiskSet::single(self.disks, disk);

        let mut keys = Vec::new();
        if let Some((k, e)) = self.intervals.range(..start).next_back() {
            if e.end > start {
                keys.push(*k);
            }
        }
        keys.extend(self.intervals.range(start..end).map(|(k, _)| *k));

        let mut pieces = Vec::with_capacity(2 * keys.len() + 1);
        let mut cursor = start;
        for k in keys {
            let Some(old) = self.intervals.remove(&k) else {
                continue;
            };
            if k < start {
                pieces.push((k, start, old.disks.clone()));
            }
            let ostart = k.max(start);
            if cursor < ostart {
                pieces.push((cursor, ostart, single.clone()));
            }
            let oend = old.end.min(end);
            pieces.push((ostart, oend, old.disks.with(disk)));
            if old.end > end {
                pieces.push((end, old.end, old.disks));
            }
            cursor = oend;
        }
        if cursor < end {
            pieces.push((cursor, end, single));
        }
        for (s, e, disks) in pieces {
            self.intervals.insert(s, Entry{end: e, disks});
        }
        self.coalesce(start, end);
    }

    /// Merge touching intervals with equal disk sets around `lo..hi`
    fn coalesce(&mut self, lo: SectorT, hi: SectorT) {
        let first = self.intervals.range(..lo)
            .next_back()
            .map(|(k, _)| *k)
            .unwrap_or(lo);
        let keys = self.intervals.range(first..=hi)
            .map(|(k, _)| *k)
            .collect::<Vec<_>>();
        let mut keys = keys.into_iter();
        let Some(mut cur) = keys.next() else {
            return;
        };
        for k in keys {
            let mergeable = match (self.intervals.get(&cur),
                                   self.intervals.get(&k))
            {
                (Some(a), Some(b)) => a.end == k && a.disks == b.disks,
                _ => false
            };
            if mergeable {
                if let Some(b) = self.intervals.remove(&k) {
                    if let Some(a) = self.intervals.get_mut(&cur) {
                        a.end = b.end;
                    }
                }
            } else {
                cur = k;
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    /// Every interval, in ascending order
    pub fn iter(&self) -> impl Iterator<Item=BadBlockInterval> + '_ {
        self.intervals.iter().map(|(start, e)| BadBlockInterval {
            start: *start,
            len: e.end - start,
            disks: e.disks.clone()
        })
    }

    /// Intervals reported by more members than the array can still lose
    pub fn unrecoverable<'a>(&'a self, geom: &'a ArrayGeometry)
        -> impl Iterator<Item=BadBlockInterval> + 'a
    {
        let degraded = geom.degraded() as usize;
        let max_loss = geom.max_tolerable_loss as usize;
        self.iter()
            .filter(move |i| i.disks.len() + degraded > max_loss)
    }

    /// Every logical range of the array that an unrecoverable interval may
    /// hold, sorted by start.
    ///
    /// An interval is split at chunk boundaries, and each piece is projected
    /// onto every data column of its stripe.
    pub fn logical_ranges(&self, geom: &ArrayGeometry) -> Vec<Range<SectorT>> {
        let chunk = geom.chunk_sectors;
        let mut out = Vec::new();
        for interval in self.unrecoverable(geom) {
            let mut ps = interval.start;
            while ps < interval.end() {
                let pe = round_down(ps, chunk)
                    .saturating_add(chunk)
                    .min(interval.end());
                out.extend(geom.member_to_logical(ps)
                    .map(|lba| lba..lba.saturating_add(pe - ps)));
                ps = pe;
            }
        }
        out.sort_unstable_by_key(|r| (r.start, r.end));
        out
    }
}

// LCOV_EXCL_STOP
