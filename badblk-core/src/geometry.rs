// vim: tw=80
//! md array geometry
//!
//! Describes how an array's logical address space is laid across its members,
//! and how much redundancy it has left.  Parity rotation is not modelled: a
//! logical chunk is known only by its stripe and its data column.

use crate::{
    config::Config,
    host::{ArrayInfo, Host},
    types::*,
};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde_derive::Serialize;
use std::ops::Range;

/// The redundancy schemes that badblk understands
#[derive(Clone, Copy, Debug, Eq, IntoPrimitive, PartialEq, Serialize,
         TryFromPrimitive)]
#[repr(i32)]
pub enum RaidLevel {
    /// RAID1
    Mirror = 1,
    /// RAID4 or RAID5
    #[num_enum(alternatives = [5])]
    Parity = 4,
    /// RAID6
    DualParity = 6,
}

impl RaidLevel {
    /// How many members the array can lose without losing data
    pub fn max_tolerable_loss(self, disk_count: u32) -> u32 {
        match self {
            RaidLevel::Mirror => disk_count.saturating_sub(1),
            RaidLevel::Parity => 1,
            RaidLevel::DualParity => 2,
        }
    }
}

/// Shape and health of one md array, as of when it was read
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ArrayGeometry {
    pub name: String,
    pub level: RaidLevel,
    /// Configured number of members
    pub disk_count: u32,
    /// Members currently in service
    pub active_disk_count: u32,
    pub chunk_sectors: SectorT,
    pub max_tolerable_loss: u32,
    /// Logical sectors covered by one stripe
    pub stripe_data_sectors: SectorT,
}

impl ArrayGeometry {
    /// Validate an array's control-interface answer.
    ///
    /// `mirror_chunk` is the window size to use for mirrors, which have no
    /// chunk size of their own.
    pub fn new(name: &str, info: &ArrayInfo, mirror_chunk: SectorT)
        -> Result<Self>
    {
        let level = RaidLevel::try_from(info.level)
            .map_err(|_| Error::UnsupportedLevel(info.level))?;
        if info.raid_disks == 0 || info.active_disks > info.raid_disks {
            return Err(Error::MetadataUnavailable);
        }
        let max_tolerable_loss = level.max_tolerable_loss(info.raid_disks);
        if max_tolerable_loss >= info.raid_disks {
            // Too few members to hold any data
            return Err(Error::MetadataUnavailable);
        }
        let degraded = info.raid_disks - info.active_disks;
        if degraded > max_tolerable_loss {
            return Err(Error::ArrayFailed);
        }
        let chunk_sectors = match (level, info.chunk_bytes / SECTOR_SIZE) {
            (RaidLevel::Mirror, 0) => mirror_chunk,
            (_, 0) => return Err(Error::MetadataUnavailable),
            (_, c) => c
        };
        let data_disks = SectorT::from(info.raid_disks - max_tolerable_loss);
        Ok(ArrayGeometry {
            name: name.to_owned(),
            level,
            disk_count: info.raid_disks,
            active_disk_count: info.active_disks,
            chunk_sectors,
            max_tolerable_loss,
            stripe_data_sectors: data_disks * chunk_sectors,
        })
    }

    /// Read and validate the geometry of the array named `name`
    #[tracing::instrument(skip(host, config))]
    pub fn probe(host: &dyn Host, name: &str, config: &Config) -> Result<Self>
    {
        let info = host.array_info(name)?;
        let geom = Self::new(name, &info, config.mirror_chunk_sectors)
            .inspect_err(|e| tracing::debug!("{name}: {e}"))?;
        tracing::debug!(
            level = ?geom.level,
            disks = geom.disk_count,
            degraded = geom.degraded(),
            chunk = geom.chunk_sectors,
            "resolved geometry"
        );
        Ok(geom)
    }

    /// Number of members currently missing
    pub fn degraded(&self) -> u32 {
        self.disk_count - self.active_disk_count
    }

    /// How many more members may go bad at a given location before its data
    /// is lost
    pub fn tolerance_margin(&self) -> u32 {
        self.max_tolerable_loss - self.degraded()
    }

    /// Members that hold data, rather than redundancy, in each stripe
    pub fn data_disks(&self) -> u32 {
        self.disk_count - self.max_tolerable_loss
    }

    /// The member-relative sectors that stripe `stripe` occupies on every
    /// member
    pub fn member_chunk(&self, stripe: u64) -> Range<SectorT> {
        let start = stripe * self.chunk_sectors;
        start..start + self.chunk_sectors
    }

    /// Member-relative address of logical sector `lba`
    pub fn logical_to_member(&self, lba: SectorT) -> SectorT {
        lba / self.stripe_data_sectors * self.chunk_sectors +
            lba % self.chunk_sectors
    }

    /// Every logical sector that member-relative sector `pba` may hold, one
    /// per data column of its stripe
    pub fn member_to_logical(&self, pba: SectorT)
        -> impl Iterator<Item=SectorT>
    {
        let chunk = self.chunk_sectors;
        let data_disks = SectorT::from(self.data_disks());
        let stripe = pba / chunk;
        let offset = pba % chunk;
        // Sectors beyond the logical address space can't be named
        (0..data_disks).filter_map(move |c| {
            stripe.checked_mul(data_disks)?
                .checked_add(c)?
                .checked_mul(chunk)?
                .checked_add(offset)
        })
    }

    /// Split logical range `range` at stripe boundaries
    pub fn windows(&self, range: Range<SectorT>) -> Windows {
        Windows {
            stripe_data_sectors: self.stripe_data_sectors,
            cursor: range.start,
            end: range.end
        }
    }
}

/// The part of a request that falls within a single stripe
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StripeWindow {
    pub stripe: u64,
    /// First logical sector
    pub start: SectorT,
    /// One past the last logical sector
    pub end: SectorT,
}

/// Iterator returned by [`ArrayGeometry::windows`]
#[derive(Clone, Debug)]
pub struct Windows {
    stripe_data_sectors: SectorT,
    cursor: SectorT,
    end: SectorT,
}

impl Iterator for Windows {
    type Item = StripeWindow;

    fn next(&mut self) -> Option<StripeWindow> {
        if self.cursor >= self.end {
            return None;
        }
        let stripe = self.cursor / self.stripe_data_sectors;
        let stripe_end = (stripe + 1) * self.stripe_data_sectors;
        let w = StripeWindow {
            stripe,
            start: self.cursor,
            end: stripe_end.min(self.end)
        };
        self.cursor = w.end;
        Some(w)
    }
}

// LCOV_EXCL_STOP
