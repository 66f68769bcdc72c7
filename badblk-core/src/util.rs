// vim: tw=80
//! Common utility functions used throughout badblk

use crate::types::*;
use std::{
    cmp,
    ops::{Add, Div, Range, Sub},
};

/// Divide two unsigned numbers (usually integers), rounding up.
pub fn div_roundup<T>(dividend: T, divisor: T) -> T
    where T: Add<Output=T> + Copy + Div<Output=T> + From<u8> + Sub<Output=T>
{
    (dividend + divisor - T::from(1u8)) / divisor
}

/// Round `x` down to a multiple of `align`
pub fn round_down(x: SectorT, align: SectorT) -> SectorT {
    x / align * align
}

/// Round `x` up to a multiple of `align`
pub fn round_up(x: SectorT, align: SectorT) -> SectorT {
    div_roundup(x, align) * align
}

/// Intersection of two half-open ranges, if not empty
pub fn intersect(a: &Range<SectorT>, b: &Range<SectorT>)
    -> Option<Range<SectorT>>
{
    let start = cmp::max(a.start, b.start);
    let end = cmp::min(a.end, b.end);
    if start < end {
        Some(start..end)
    } else {
        None
    }
}

/// Sort a list of ranges and merge those that overlap or touch.
pub fn coalesce(mut ranges: Vec<BadRange>) -> Vec<BadRange> {
    ranges.retain(|r| r.len > 0);
    ranges.sort_unstable();
    let mut out: Vec<BadRange> = Vec::with_capacity(ranges.len());
    for r in ranges.into_iter() {
        match out.last_mut() {
            Some(last) if r.start <= last.end() => {
                let end = cmp::max(last.end(), r.end());
                last.len = end - last.start;
            }
            _ => out.push(r)
        }
    }
    out
}

// LCOV_EXCL_STOP
