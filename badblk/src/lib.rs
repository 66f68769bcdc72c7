// vim: tw=80
//! Bad block lookup for md arrays and the linear volumes stacked on them
//!
//! This library is for programmatic access to badblk.  It is intended to be a
//! stable API.

use std::fs::File;

use badblk_core::{host::LiveHost, Engine};
pub use badblk_core::{
    geometry::ArrayGeometry,
    BadRange,
    Config,
    Error,
    IoDir,
    QueryResult,
    Result,
};

/// A handle on the running system's storage stack
pub struct Badblk {
    engine: Engine<LiveHost>,
}

impl Default for Badblk {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Badblk {
    pub fn new(config: Config) -> Self {
        Badblk{engine: Engine::live(config)}
    }

    /// Would an I/O to an open block device land on unrecoverable bad blocks?
    ///
    /// # Arguments
    ///
    /// `file`      -   An open block device
    /// `offset`    -   Byte offset of the I/O
    /// `len`       -   Length of the I/O in bytes
    /// `write`     -   Whether the I/O is a write
    pub fn query(&self, file: &File, offset: u64, len: u64, write: bool)
        -> QueryResult
    {
        self.engine.query_file(file, offset, len, IoDir::from(write))
    }

    /// Like [`Badblk::query`], but returns 0 for clear, 1 for a hit, and -1 if
    /// the answer is unknown.
    pub fn is_badblock(&self, file: &File, offset: u64, len: u64, write: bool)
        -> i32
    {
        self.query(file, offset, len, write).into()
    }

    /// List every unrecoverable sector range of a linear device-mapper volume
    ///
    /// # Arguments
    ///
    /// `volume`    -   device-mapper name of the volume, like "vg0-lv0"
    pub fn get_bad_ranges(&self, volume: &str) -> Result<Vec<BadRange>> {
        self.engine.get_bad_ranges(volume)
    }

    /// Describe an md array, like "md0"
    pub fn geometry(&self, name: &str) -> Result<ArrayGeometry> {
        self.engine.geometry(name)
    }
}

/// Would an I/O to an open block device land on unrecoverable bad blocks?
///
/// Returns 0 for clear, 1 for a hit, and -1 if the answer is unknown.
pub fn is_badblock(file: &File, offset: u64, len: u64, write: bool) -> i32 {
    Badblk::default().is_badblock(file, offset, len, write)
}

/// List every unrecoverable sector range of the linear device-mapper volume
/// named `volume`.
pub fn get_bad_ranges(volume: &str) -> Result<Vec<BadRange>> {
    Badblk::default().get_bad_ranges(volume)
}

// LCOV_EXCL_STOP
