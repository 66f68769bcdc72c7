// vim: tw=80
//! Per-member bad block reports
//!
//! md keeps a bad block log for each member, expressed in the member's own
//! sector numbers.  Here those reports are rebased to the start of the
//! member's data area, where the array's layout begins.

use crate::{
    host::Host,
    types::*,
    util::intersect,
};
use itertools::Itertools;
use std::ops::Range;

/// Names of the member attributes that hold bad block lists
const REPORTS: [&str; 2] = ["bad_blocks", "unacknowledged_bad_blocks"];

/// A bad range on one member, relative to the start of its data area
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct MemberBadRange {
    pub start: SectorT,
    pub len: SectorT,
}

impl MemberBadRange {
    pub fn range(&self) -> Range<SectorT> {
        self.start..self.start.saturating_add(self.len)
    }
}

/// Parse one "<start> <len>" line of a bad block list
pub fn parse_report_line(line: &str) -> Result<(SectorT, SectorT)> {
    let (start, len) = line.split_whitespace()
        .collect_tuple()
        .ok_or(Error::MalformedReport)?;
    let start = start.parse::<SectorT>().map_err(|_| Error::MalformedReport)?;
    let len = len.parse::<SectorT>().map_err(|_| Error::MalformedReport)?;
    if len == 0 {
        return Err(Error::MalformedReport);
    }
    // The end, widened to a whole page, must still be addressable
    if start.checked_add(len)
        .and_then(|end| end.checked_next_multiple_of(PAGE_SECTORS))
        .is_none()
    {
        return Err(Error::MalformedReport);
    }
    Ok((start, len))
}

/// Rebase a raw report onto the data area that begins at `data_offset`.
///
/// Whatever lies before the data area is discarded.
pub fn correct_offset(start: SectorT, len: SectorT, data_offset: SectorT)
    -> Option<MemberBadRange>
{
    let end = start.checked_add(len)?;
    if end <= data_offset {
        None
    } else if start < data_offset {
        Some(MemberBadRange{start: 0, len: end - data_offset})
    } else {
        Some(MemberBadRange{start: start - data_offset, len})
    }
}

/// Every bad range currently reported by one member of an array
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MemberSource {
    ranges: Vec<MemberBadRange>
}

impl MemberSource {
    pub fn new(mut ranges: Vec<MemberBadRange>) -> Self {
        ranges.sort_unstable();
        MemberSource{ranges}
    }

    /// Read the bad block lists of member `idx` of `array`.
    ///
    /// Never fails: a member that can't be examined contributes no ranges.
    pub fn read(host: &dyn Host, array: &str, idx: u32) -> Self {
        if !host.member_present(array, idx) {
            tracing::debug!("{array}: no member in slot {idx}");
            return Self::default();
        }
        if let Ok(Some(state)) = host.member_attr(array, idx, "state") {
            if state.trim().split(',').any(|s| s == "faulty") {
                tracing::debug!("{array}: member {idx} is faulty");
                return Self::default();
            }
        }
        let data_offset = match host.member_attr(array, idx, "offset") {
            Ok(Some(s)) => match s.trim().parse::<SectorT>() {
                Ok(o) => o,
                Err(_) => {
                    tracing::warn!("{array}: member {idx} has malformed offset");
                    return Self::default();
                }
            },
            Ok(None) | Err(_) => {
                tracing::warn!("{array}: cannot read offset of member {idx}");
                return Self::default();
            }
        };

        let mut ranges = Vec::new();
        for report in REPORTS {
            let contents = match host.member_attr(array, idx, report) {
                Ok(Some(s)) => s,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!("{array}: member {idx} {report}: {e}");
                    continue;
                }
            };
            for line in contents.lines().filter(|l| !l.trim().is_empty()) {
                match parse_report_line(line) {
                    Ok((start, len)) => ranges.extend(
                        correct_offset(start, len, data_offset)),
                    Err(e) => tracing::debug!(
                        "{array}: member {idx} {report}: {e}: {line:?}")
                }
            }
        }
        Self::new(ranges)
    }

    pub fn ranges(&self) -> &[MemberBadRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// The parts of this member's bad ranges that fall within `window`
    pub fn ranges_in<'a>(&'a self, window: &'a Range<SectorT>)
        -> impl Iterator<Item=Range<SectorT>> + 'a
    {
        self.ranges.iter()
            .take_while(move |r| r.start < window.end)
            .filter_map(move |r| intersect(&r.range(), window))
    }
}

// LCOV_EXCL_STOP
