// vim: tw=80
//! Per-stripe bad block aggregation
//!
//! Decides whether any page of a stripe window is bad on more members than
//! the array can still afford to lose.

use crate::{
    bitmap::{PageBitmap, StripeMatrix},
    geometry::{ArrayGeometry, StripeWindow},
    member::MemberSource,
};

/// Combines the reports of every member of one array
pub struct StripeAggregator<'a> {
    geom: &'a ArrayGeometry,
    members: &'a [MemberSource],
}

impl<'a> StripeAggregator<'a> {
    /// `members` is indexed by member slot.  Slots beyond its end are treated
    /// as having no reports.
    pub fn new(geom: &'a ArrayGeometry, members: &'a [MemberSource]) -> Self {
        StripeAggregator{geom, members}
    }

    /// The in-chunk pages that `w` touches on any of its data columns.
    ///
    /// Since parity rotation isn't modelled, every member is examined at the
    /// same in-chunk offsets.
    pub fn window_mask(&self, w: &StripeWindow) -> PageBitmap {
        let chunk = self.geom.chunk_sectors;
        let mut mask = PageBitmap::for_chunk(chunk);
        if w.start >= w.end {
            return mask;
        }
        let base = w.stripe * self.geom.stripe_data_sectors;
        let off_start = w.start - base;
        let off_end = w.end - base;
        let first_col = off_start / chunk;
        let last_col = (off_end - 1) / chunk;
        let a = off_start % chunk;
        let b = off_end - last_col * chunk;
        match last_col - first_col {
            0 => mask.set_sectors(a..b),
            1 => {
                mask.set_sectors(a..chunk);
                mask.set_sectors(0..b);
            }
            _ => mask.set_sectors(0..chunk)
        }
        mask
    }

    /// Rasterise every member's bad ranges within `w`'s member chunk, limited
    /// to the window mask
    pub fn matrix(&self, w: &StripeWindow) -> StripeMatrix {
        let mask = self.window_mask(w);
        let chunk = self.geom.member_chunk(w.stripe);
        let mut matrix = StripeMatrix::new(self.geom.disk_count as usize,
                                           mask.len());
        for (disk, src) in self.members.iter().enumerate() {
            let Some(row) = matrix.row_mut(disk) else {
                break;
            };
            for r in src.ranges_in(&chunk) {
                row.set_sectors(r.start - chunk.start..r.end - chunk.start);
            }
            row.intersect_with(&mask);
        }
        matrix
    }

    /// Is any page of `w` bad on more members than the array can tolerate?
    pub fn is_hit(&self, w: &StripeWindow) -> bool {
        let margin = self.geom.tolerance_margin() as usize;
        match self.matrix(w).first_exceeding(margin) {
            Some(bit) => {
                tracing::debug!(stripe = w.stripe, page = bit,
                                "{}: unrecoverable", self.geom.name);
                true
            }
            None => false
        }
    }
}

// LCOV_EXCL_STOP
