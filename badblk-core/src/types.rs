// vim: tw=80
//! Common type definitions used throughout badblk

use serde_derive::Serialize;
use thiserror::Error;
use std::{
    fmt::{self, Display, Formatter},
    io,
};

/// Indexes a 512-byte sector
pub type SectorT = u64;

/// Bytes in a sector.  Every address exposed by md and device-mapper is in
/// these units, regardless of the device's logical block size.
pub const SECTOR_SIZE: u64 = 512;

/// Bytes in a page.  Writes are page-atomic at the device layer, and bad block
/// reports finer than a page carry no useful information.
pub const PAGE_SIZE: u64 = 4096;

/// Sectors per page
pub const PAGE_SECTORS: SectorT = PAGE_SIZE / SECTOR_SIZE;

/// Block device major number of md(4) arrays.  Unlike device-mapper, it is
/// statically assigned.
pub const MD_MAJOR: u32 = 9;

/// badblk's error type.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq, Serialize)]
pub enum Error {
    /// Non-linear mapping, partitioned array, unknown major, or mapping chain
    /// too deep
    #[error("Unsupported storage topology")]
    UnsupportedTopology,
    /// Device name or device-mapper table could not be resolved
    #[error("Storage topology unavailable")]
    TopologyUnavailable,
    /// The array has already lost more disks than its redundancy allows
    #[error("Array has failed")]
    ArrayFailed,
    /// Redundancy scheme is not mirrored, single parity, or dual parity
    #[error("Unsupported RAID level {0}")]
    UnsupportedLevel(i32),
    /// A required metadata read failed
    #[error("Metadata unavailable")]
    MetadataUnavailable,
    /// One line of a bad block report could not be parsed.  Never escalated
    /// past the member that produced it.
    #[error("Malformed bad block report")]
    MalformedReport,
}

impl From<io::Error> for Error {
    fn from(_e: io::Error) -> Self {
        Error::MetadataUnavailable
    }
}

impl From<nix::Error> for Error {
    fn from(_e: nix::Error) -> Self {
        Error::MetadataUnavailable
    }
}

pub type Result<T> = ::std::result::Result<T, Error>;

/// Direction of the I/O that a query is made on behalf of.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum IoDir {
    #[default]
    Read,
    Write
}

impl From<bool> for IoDir {
    fn from(write: bool) -> Self {
        if write {
            IoDir::Write
        } else {
            IoDir::Read
        }
    }
}

/// The answer to "does this I/O land on unrecoverable bad blocks?"
///
/// Computed fresh by each query, never cached.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum QueryResult {
    /// Every examined region is still recoverable
    Clear,
    /// At least one examined region is bad on more disks than the array can
    /// tolerate
    Hit,
    /// Some layer could not be resolved.  Distinct from `Clear`: unknown is
    /// never known-safe.
    Error(Error)
}

impl QueryResult {
    pub fn is_hit(&self) -> bool {
        matches!(self, QueryResult::Hit)
    }
}

impl From<Result<bool>> for QueryResult {
    fn from(r: Result<bool>) -> Self {
        match r {
            Ok(true) => QueryResult::Hit,
            Ok(false) => QueryResult::Clear,
            Err(e) => QueryResult::Error(e)
        }
    }
}

impl From<QueryResult> for i32 {
    fn from(qr: QueryResult) -> Self {
        match qr {
            QueryResult::Clear => 0,
            QueryResult::Hit => 1,
            QueryResult::Error(_) => -1
        }
    }
}

impl Display for QueryResult {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            QueryResult::Clear => f.write_str("clear"),
            QueryResult::Hit => f.write_str("hit"),
            QueryResult::Error(e) => write!(f, "error: {e}")
        }
    }
}

/// A range of bad sectors in some device's address space.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd,
         Serialize)]
pub struct BadRange {
    pub start: SectorT,
    pub len: SectorT,
}

impl BadRange {
    pub fn new(start: SectorT, len: SectorT) -> Self {
        BadRange{start, len}
    }

    /// One past the last sector
    pub fn end(&self) -> SectorT {
        self.start + self.len
    }
}

// LCOV_EXCL_STOP
