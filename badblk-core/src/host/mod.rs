// vim: tw=80
//! Read-only access to the host storage stack
//!
//! Everything the engine knows about the system comes through the [`Host`]
//! trait: driver majors, device names, device-mapper tables, md array
//! attributes and per-member bad block reports.  [`LiveHost`] reads them from
//! procfs, sysfs, and the device-mapper control node.

use crate::{
    config::Config,
    types::*,
};
#[cfg(test)] use mockall::automock;
use std::{
    fs,
    io,
    path::{Path, PathBuf},
};

mod dm;
mod procfs;

pub use self::dm::{DmControl, DmIoctl};
#[cfg(test)] pub use self::dm::MockDmControl;
pub use self::procfs::{parse_devices, parse_partitions};

/// Block device majors that are assigned dynamically, as registered in
/// `/proc/devices`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DriverMajors {
    pub device_mapper: Option<u32>,
    pub mdp: Option<u32>,
}

/// Identifies a device-mapper device.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DmDevice {
    Number{major: u32, minor: u32},
    Name(String),
}

/// One row of a device-mapper table, exactly as the kernel reports it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DmTarget {
    /// First sector of the mapped device covered by this row
    pub start: SectorT,
    /// Number of sectors covered
    pub length: SectorT,
    /// Target type, like "linear" or "striped"
    pub target_type: String,
    /// Target-specific parameters
    pub params: String,
}

/// Answer from an md array's control interface
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ArrayInfo {
    /// md personality number.  `linear` is -1, `raidN` is N.
    pub level: i32,
    pub raid_disks: u32,
    pub active_disks: u32,
    /// Chunk size in bytes.  0 for mirrors.
    pub chunk_bytes: u64,
}

/// Read-only view of the kernel's storage metadata.
#[cfg_attr(test, automock)]
pub trait Host {
    /// Majors of the device-mapper and partitioned-md drivers
    fn driver_majors(&self) -> Result<DriverMajors>;

    /// Kernel name of the block device with the given number, like "md0"
    fn devname(&self, major: u32, minor: u32) -> Result<String>;

    /// The device-mapper table of `dev`
    fn dm_table(&self, dev: &DmDevice) -> Result<Vec<DmTarget>>;

    /// Shape and health of the md array named `name`
    fn array_info(&self, name: &str) -> Result<ArrayInfo>;

    /// Does the array currently have a member in slot `idx`?
    fn member_present(&self, array: &str, idx: u32) -> bool;

    /// Contents of one of the member's attributes, or `None` if the member or
    /// its attribute does not exist.
    fn member_attr(&self, array: &str, idx: u32, attr: &str)
        -> Result<Option<String>>;
}

/// Translate an md `level` attribute into its personality number
fn parse_level(s: &str) -> Result<i32> {
    match s {
        "linear" => Ok(-1),
        "multipath" => Ok(-4),
        "faulty" => Ok(-5),
        _ => s.strip_prefix("raid")
            .and_then(|n| n.parse::<i32>().ok())
            .ok_or(Error::MetadataUnavailable)
    }
}

/// The live system
pub struct LiveHost {
    sysfs_root: PathBuf,
    procfs_root: PathBuf,
    dm: Box<dyn DmControl>,
}

impl LiveHost {
    pub fn new(config: &Config) -> Self {
        let dm = Box::new(DmIoctl::new(&config.dm_control));
        Self::with_dm_control(config, dm)
    }

    /// Use an alternate source of device-mapper tables
    pub fn with_dm_control(config: &Config, dm: Box<dyn DmControl>) -> Self {
        LiveHost {
            sysfs_root: config.sysfs_root.clone(),
            procfs_root: config.procfs_root.clone(),
            dm
        }
    }

    fn md_dir(&self, name: &str) -> PathBuf {
        self.sysfs_root.join("block").join(name).join("md")
    }

    fn member_dir(&self, array: &str, idx: u32) -> PathBuf {
        self.md_dir(array).join(format!("rd{idx}"))
    }

    fn read_attr(path: &Path) -> Result<String> {
        fs::read_to_string(path)
            .map(|s| s.trim().to_owned())
            .map_err(|e| {
                tracing::debug!("cannot read {}: {e}", path.display());
                Error::MetadataUnavailable
            })
    }

    fn read_num<T: std::str::FromStr>(path: &Path) -> Result<T> {
        Self::read_attr(path)?
            .parse::<T>()
            .map_err(|_| {
                tracing::debug!("malformed attribute {}", path.display());
                Error::MetadataUnavailable
            })
    }
}

impl Host for LiveHost {
    fn driver_majors(&self) -> Result<DriverMajors> {
        let path = self.procfs_root.join("devices");
        let s = fs::read_to_string(&path)
            .map_err(|_| Error::TopologyUnavailable)?;
        Ok(parse_devices(&s))
    }

    fn devname(&self, major: u32, minor: u32) -> Result<String> {
        let path = self.procfs_root.join("partitions");
        let s = fs::read_to_string(&path)
            .map_err(|_| Error::TopologyUnavailable)?;
        parse_partitions(&s, major, minor)
            .ok_or(Error::TopologyUnavailable)
    }

    fn dm_table(&self, dev: &DmDevice) -> Result<Vec<DmTarget>> {
        self.dm.table(dev)
    }

    fn array_info(&self, name: &str) -> Result<ArrayInfo> {
        let md = self.md_dir(name);
        let level = parse_level(&Self::read_attr(&md.join("level"))?)?;
        let raid_disks: u32 = Self::read_num(&md.join("raid_disks"))?;
        let degraded: u32 = Self::read_num(&md.join("degraded"))?;
        let chunk_bytes: u64 = Self::read_num(&md.join("chunk_size"))?;
        let active_disks = raid_disks.checked_sub(degraded)
            .ok_or(Error::MetadataUnavailable)?;
        Ok(ArrayInfo{level, raid_disks, active_disks, chunk_bytes})
    }

    fn member_present(&self, array: &str, idx: u32) -> bool {
        self.member_dir(array, idx).exists()
    }

    fn member_attr(&self, array: &str, idx: u32, attr: &str)
        -> Result<Option<String>>
    {
        let path = self.member_dir(array, idx).join(attr);
        match fs::read_to_string(&path) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into())
        }
    }
}

// LCOV_EXCL_STOP
