// vim: tw=80
//! Fixed-width page bitmaps
//!
//! One bit stands for one page of one chunk.  Every setter clips to the
//! bitmap's width, so a bad range that runs off the end of a chunk can never
//! touch bits that don't exist.

use crate::types::*;
use crate::util::div_roundup;
use fixedbitset::FixedBitSet;
use std::ops::Range;

/// One bit per page of a chunk
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PageBitmap(FixedBitSet);

impl PageBitmap {
    /// A cleared bitmap with `bits` bits
    pub fn new(bits: usize) -> Self {
        PageBitmap(FixedBitSet::with_capacity(bits))
    }

    /// A cleared bitmap wide enough for a chunk of `chunk` sectors
    pub fn for_chunk(chunk: SectorT) -> Self {
        Self::new(div_roundup(chunk, PAGE_SECTORS) as usize)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.len() == 0
    }

    /// Set bits `range`.  The part that lies beyond the bitmap is ignored.
    pub fn set_range(&mut self, range: Range<usize>) {
        let end = range.end.min(self.0.len());
        if range.start < end {
            self.0.insert_range(range.start..end);
        }
    }

    /// Set the bits of every page that overlaps the chunk-relative sector
    /// range `sectors`.
    pub fn set_sectors(&mut self, sectors: Range<SectorT>) {
        if sectors.start >= sectors.end {
            return;
        }
        let first = sectors.start / PAGE_SECTORS;
        let last = div_roundup(sectors.end, PAGE_SECTORS);
        self.set_range(first as usize..last as usize);
    }

    /// Is bit `bit` set?  Bits beyond the end never are.
    pub fn contains(&self, bit: usize) -> bool {
        self.0.contains(bit)
    }

    pub fn count_ones(&self) -> usize {
        self.0.count_ones(..)
    }

    pub fn intersect_with(&mut self, other: &PageBitmap) {
        self.0.intersect_with(&other.0);
    }

    pub fn union_with(&mut self, other: &PageBitmap) {
        self.0.union_with(&other.0);
    }

    /// Iterate over the indices of set bits, in ascending order
    pub fn iter_set(&self) -> impl Iterator<Item=usize> + '_ {
        self.0.ones()
    }
}

/// One [`PageBitmap`] per disk of an array, all the same width.
///
/// Lives on the heap, since its size depends on the array's geometry.
#[derive(Clone, Debug)]
pub struct StripeMatrix {
    rows: Vec<PageBitmap>
}

impl StripeMatrix {
    pub fn new(disks: usize, bits: usize) -> Self {
        StripeMatrix{rows: vec![PageBitmap::new(bits); disks]}
    }

    pub fn disks(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, disk: usize) -> Option<&PageBitmap> {
        self.rows.get(disk)
    }

    pub fn row_mut(&mut self, disk: usize) -> Option<&mut PageBitmap> {
        self.rows.get_mut(disk)
    }

    /// Bits that are set on any disk
    pub fn union(&self) -> Option<PageBitmap> {
        let mut rows = self.rows.iter();
        let mut u = rows.next()?.clone();
        for row in rows {
            u.union_with(row);
        }
        Some(u)
    }

    /// How many disks have bit `bit` set
    pub fn popcount_at(&self, bit: usize) -> usize {
        self.rows.iter()
            .filter(|row| row.contains(bit))
            .count()
    }

    /// The lowest bit that is set on more than `margin` disks, if any.
    ///
    /// Only bits set somewhere are examined, and each bit's count starts from
    /// zero.
    pub fn first_exceeding(&self, margin: usize) -> Option<usize> {
        self.union()?
            .iter_set()
            .find(|bit| self.popcount_at(*bit) > margin)
    }
}

// LCOV_EXCL_STOP
