// vim: tw=80
//! Topology resolution
//!
//! Identifies what kind of block device a device number refers to, and for
//! device-mapper devices, which underlying devices back which sectors.

use crate::{
    host::{DmDevice, DmTarget, DriverMajors, Host},
    types::*,
    util::intersect,
};
use std::{
    fs::File,
    ops::Range,
    os::unix::fs::{FileTypeExt, MetadataExt},
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeviceKind {
    /// A whole md array
    Array,
    /// A device-mapper device.  Whether its table is really linear isn't known
    /// until the table is read.
    LinearMap,
    /// A partition of an md array
    PartitionedArray,
    Unsupported
}

/// A block device, classified by its driver
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DeviceHandle {
    pub major: u32,
    pub minor: u32,
    pub kind: DeviceKind,
}

impl DeviceHandle {
    /// Classify a device number
    pub fn resolve(major: u32, minor: u32, majors: &DriverMajors) -> Self {
        let kind = if major == MD_MAJOR {
            DeviceKind::Array
        } else if Some(major) == majors.device_mapper {
            DeviceKind::LinearMap
        } else if Some(major) == majors.mdp {
            DeviceKind::PartitionedArray
        } else {
            DeviceKind::Unsupported
        };
        DeviceHandle{major, minor, kind}
    }

    /// Classify an open block device
    pub fn from_file(file: &File, majors: &DriverMajors) -> Result<Self> {
        let md = file.metadata()?;
        if !md.file_type().is_block_device() {
            return Err(Error::UnsupportedTopology);
        }
        let rdev = md.rdev() as libc::dev_t;
        let major = libc::major(rdev);
        let minor = libc::minor(rdev);
        Ok(Self::resolve(major, minor, majors))
    }

    pub fn dm_device(&self) -> DmDevice {
        DmDevice::Number{major: self.major, minor: self.minor}
    }
}

/// One row of a linear device-mapper table
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LinearTarget {
    /// First sector of the mapped device covered by this row
    pub source_start: SectorT,
    pub length: SectorT,
    pub target_major: u32,
    pub target_minor: u32,
    /// Sector of the underlying device that `source_start` maps to
    pub target_offset: SectorT,
}

impl LinearTarget {
    /// Sectors of the mapped device covered by this target
    pub fn source_range(&self) -> Range<SectorT> {
        self.source_start..self.source_start + self.length
    }

    /// Sectors of the underlying device covered by this target
    pub fn target_range(&self) -> Range<SectorT> {
        self.target_offset..self.target_offset + self.length
    }

    /// Translate the part of `range` that this target covers into the
    /// underlying device's address space.
    pub fn to_target(&self, range: &Range<SectorT>) -> Option<Range<SectorT>> {
        intersect(range, &self.source_range()).map(|r| {
            r.start - self.source_start + self.target_offset..
                r.end - self.source_start + self.target_offset
        })
    }

    /// Translate the part of an underlying device's `range` that this target
    /// exposes back into the mapped device's address space.
    pub fn to_source(&self, range: &Range<SectorT>) -> Option<Range<SectorT>> {
        intersect(range, &self.target_range()).map(|r| {
            r.start - self.target_offset + self.source_start..
                r.end - self.target_offset + self.source_start
        })
    }
}

impl TryFrom<&DmTarget> for LinearTarget {
    type Error = Error;

    /// Parse a row of type "linear", whose parameters are "MAJ:MIN OFFSET"
    fn try_from(t: &DmTarget) -> Result<Self> {
        if t.target_type != "linear" {
            tracing::debug!("unsupported target type {}", t.target_type);
            return Err(Error::UnsupportedTopology);
        }
        let mut fields = t.params.split_whitespace();
        let (Some(dev), Some(offset), None) =
            (fields.next(), fields.next(), fields.next()) else
        {
            return Err(Error::TopologyUnavailable);
        };
        let (maj, min) = dev.split_once(':')
            .ok_or(Error::TopologyUnavailable)?;
        let parse = |s: &str| s.parse::<u32>()
            .map_err(|_| Error::TopologyUnavailable);
        Ok(LinearTarget {
            source_start: t.start,
            length: t.length,
            target_major: parse(maj)?,
            target_minor: parse(min)?,
            target_offset: offset.parse()
                .map_err(|_| Error::TopologyUnavailable)?,
        })
    }
}

/// Read and validate the table of a linear device-mapper device.
///
/// Any row that isn't "linear" makes the whole device unsupported.  The
/// returned targets are sorted and non-overlapping.
pub fn linear_targets(host: &dyn Host, dev: &DmDevice)
    -> Result<Vec<LinearTarget>>
{
    let table = host.dm_table(dev)?;
    let mut targets = table.iter()
        .map(LinearTarget::try_from)
        .collect::<Result<Vec<_>>>()?;
    targets.sort_by_key(|t| t.source_start);
    for pair in targets.windows(2) {
        if pair[0].source_range().end > pair[1].source_start {
            tracing::warn!("overlapping targets in table of {dev:?}");
            return Err(Error::TopologyUnavailable);
        }
    }
    Ok(targets)
}

/// Split a request on a linear device into per-target pieces, each expressed
/// in its target's underlying address space.
///
/// Every sector of `range` must be covered by some target.
pub fn split_request(targets: &[LinearTarget], range: &Range<SectorT>)
    -> Result<Vec<(LinearTarget, Range<SectorT>)>>
{
    let mut pieces = Vec::new();
    let mut cursor = range.start;
    for t in targets.iter() {
        if cursor >= range.end {
            break;
        }
        let Some(sub) = t.to_target(range) else {
            continue;
        };
        if t.source_start > cursor {
            tracing::warn!("sector {cursor} is not mapped");
            return Err(Error::TopologyUnavailable);
        }
        cursor = t.source_range().end;
        pieces.push((*t, sub));
    }
    if cursor < range.end {
        tracing::warn!("sector {cursor} is not mapped");
        return Err(Error::TopologyUnavailable);
    }
    Ok(pieces)
}

// LCOV_EXCL_STOP
