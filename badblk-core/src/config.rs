// vim: tw=80
//! Runtime configuration
//!
//! Everything here has a sensible default for a live Linux host.  Overriding
//! the roots is mostly useful for examining a captured copy of a system's
//! sysfs and procfs.

use crate::types::*;
use serde_derive::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Default bound on device-mapper → device-mapper hops
pub const DEFAULT_MAX_DEPTH: u32 = 8;

/// md reports a chunk size of 0 for mirrors.  Their layout is the identity, so
/// any window size works; this one is a typical RAID chunk.
pub const DEFAULT_MIRROR_CHUNK_SECTORS: SectorT = 128;

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Where sysfs is mounted
    pub sysfs_root: PathBuf,
    /// Where procfs is mounted
    pub procfs_root: PathBuf,
    /// The device-mapper control node
    pub dm_control: PathBuf,
    /// Maximum number of chained linear mappings to follow
    pub max_depth: u32,
    /// Window size used for mirrors, in sectors
    pub mirror_chunk_sectors: SectorT,
}

impl Config {
    /// Load a configuration from a YAML file.  Missing fields take their
    /// default values.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        Self::from_yaml(&s)
    }

    pub fn from_yaml(s: &str) -> Result<Self> {
        let config: Config = serde_yaml_ng::from_str(s).map_err(|e| {
            tracing::error!("invalid configuration: {e}");
            Error::MetadataUnavailable
        })?;
        if config.mirror_chunk_sectors == 0 ||
            config.mirror_chunk_sectors % PAGE_SECTORS != 0
        {
            tracing::error!("mirror_chunk_sectors must be a nonzero multiple \
                            of {PAGE_SECTORS}");
            return Err(Error::MetadataUnavailable);
        }
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            sysfs_root: PathBuf::from("/sys"),
            procfs_root: PathBuf::from("/proc"),
            dm_control: PathBuf::from("/dev/mapper/control"),
            max_depth: DEFAULT_MAX_DEPTH,
            mirror_chunk_sectors: DEFAULT_MIRROR_CHUNK_SECTORS,
        }
    }
}

// LCOV_EXCL_STOP
