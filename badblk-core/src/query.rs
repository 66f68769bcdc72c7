// vim: tw=80
//! Query orchestration
//!
//! Walks from a block device down through any linear device-mapper layers to
//! the md arrays beneath, and combines their verdicts.

use crate::{
    aggregator::StripeAggregator,
    config::Config,
    geometry::ArrayGeometry,
    host::{DmDevice, DriverMajors, Host, LiveHost},
    member::MemberSource,
    registry::Registry,
    topology::{self, DeviceHandle, DeviceKind, LinearTarget},
    types::*,
    util::{coalesce, intersect},
};
use std::{
    fs::File,
    ops::Range,
};

/// Convert a byte-addressed request into the sectors it touches.
///
/// Writes are page-atomic, so a write's start is rounded down to a page.
/// A request that ends past the last addressable sector can't be examined.
pub fn request_range(offset: u64, len: u64, dir: IoDir)
    -> Result<Range<SectorT>>
{
    let start = match dir {
        IoDir::Read => offset / SECTOR_SIZE,
        IoDir::Write => offset / PAGE_SIZE * PAGE_SECTORS,
    };
    let end = offset.checked_add(len)
        .ok_or(Error::TopologyUnavailable)?;
    let end = end / SECTOR_SIZE + SectorT::from(end % SECTOR_SIZE != 0);
    Ok(start..end)
}

/// Everything one top-level query needs to know about the host.
///
/// Built afresh for every query, and never shared between them.
pub struct QueryContext<'a> {
    host: &'a dyn Host,
    config: &'a Config,
    majors: DriverMajors,
}

impl<'a> QueryContext<'a> {
    pub fn new(host: &'a dyn Host, config: &'a Config) -> Result<Self> {
        let majors = host.driver_majors()?;
        Ok(QueryContext{host, config, majors})
    }

    pub fn resolve(&self, major: u32, minor: u32) -> DeviceHandle {
        DeviceHandle::resolve(major, minor, &self.majors)
    }

    fn child(&self, t: &LinearTarget) -> DeviceHandle {
        self.resolve(t.target_major, t.target_minor)
    }

    fn geometry(&self, handle: &DeviceHandle) -> Result<ArrayGeometry> {
        let name = self.host.devname(handle.major, handle.minor)?;
        ArrayGeometry::probe(self.host, &name, self.config)
    }

    fn members(&self, geom: &ArrayGeometry) -> Vec<MemberSource> {
        (0..geom.disk_count)
            .map(|i| MemberSource::read(self.host, &geom.name, i))
            .collect()
    }

    /// Would I/O to `range` of `handle` hit unrecoverable bad blocks?
    pub fn query(&self, handle: &DeviceHandle, range: Range<SectorT>)
        -> QueryResult
    {
        match handle.kind {
            DeviceKind::PartitionedArray | DeviceKind::Unsupported => {
                QueryResult::Error(Error::UnsupportedTopology)
            }
            _ if range.start >= range.end => QueryResult::Clear,
            _ => self.check(handle, range, 0).into()
        }
    }

    fn check(&self, handle: &DeviceHandle, range: Range<SectorT>, depth: u32)
        -> Result<bool>
    {
        match handle.kind {
            DeviceKind::Array => self.check_array(handle, range),
            DeviceKind::LinearMap => self.check_linear(handle, range, depth),
            DeviceKind::PartitionedArray | DeviceKind::Unsupported => {
                Err(Error::UnsupportedTopology)
            }
        }
    }

    fn check_array(&self, handle: &DeviceHandle, range: Range<SectorT>)
        -> Result<bool>
    {
        let geom = self.geometry(handle)?;
        let members = self.members(&geom);
        let agg = StripeAggregator::new(&geom, &members);
        let mut windows = geom.windows(range);
        Ok(windows.any(|w| agg.is_hit(&w)))
    }

    fn check_linear(&self, handle: &DeviceHandle, range: Range<SectorT>,
                    depth: u32) -> Result<bool>
    {
        if depth >= self.config.max_depth {
            tracing::warn!("{}:{}: too many linear layers", handle.major,
                           handle.minor);
            return Err(Error::UnsupportedTopology);
        }
        let targets = topology::linear_targets(self.host, &handle.dm_device())?;
        for (t, sub) in topology::split_request(&targets, &range)? {
            if self.check(&self.child(&t), sub, depth + 1)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Unrecoverable ranges of `handle` that lie within `window`, in the
    /// device's own address space
    fn bad_ranges(&self, handle: &DeviceHandle, window: Range<SectorT>,
                  depth: u32) -> Result<Vec<BadRange>>
    {
        match handle.kind {
            DeviceKind::Array => {
                let geom = self.geometry(handle)?;
                let members = self.members(&geom);
                let reg = Registry::from_members(&geom, &members);
                Ok(reg.logical_ranges(&geom).iter()
                    .filter_map(|r| intersect(r, &window))
                    .map(|r| BadRange::new(r.start, r.end - r.start))
                    .collect())
            }
            DeviceKind::LinearMap => {
                if depth >= self.config.max_depth {
                    return Err(Error::UnsupportedTopology);
                }
                let targets = topology::linear_targets(self.host,
                                                       &handle.dm_device())?;
                self.linear_bad_ranges(&targets, window, depth)
            }
            DeviceKind::PartitionedArray | DeviceKind::Unsupported => {
                Err(Error::UnsupportedTopology)
            }
        }
    }

    fn linear_bad_ranges(&self, targets: &[LinearTarget],
                         window: Range<SectorT>, depth: u32)
        -> Result<Vec<BadRange>>
    {
        let mut out = Vec::new();
        for t in targets {
            let Some(sub) = t.to_target(&window) else {
                continue;
            };
            for r in self.bad_ranges(&self.child(t), sub, depth + 1)? {
                if let Some(s) = t.to_source(&(r.start..r.end())) {
                    out.push(BadRange::new(s.start, s.end - s.start));
                }
            }
        }
        Ok(out)
    }

    /// Every unrecoverable range of the linear volume `dev`
    pub fn volume_bad_ranges(&self, dev: &DmDevice) -> Result<Vec<BadRange>> {
        let targets = topology::linear_targets(self.host, dev)?;
        let ranges = self.linear_bad_ranges(&targets, 0..SectorT::MAX, 0)?;
        Ok(coalesce(ranges))
    }
}

/// The bad block query engine
pub struct Engine<H: Host> {
    host: H,
    config: Config,
}

impl Engine<LiveHost> {
    /// An engine that examines the running system
    pub fn live(config: Config) -> Self {
        let host = LiveHost::new(&config);
        Engine{host, config}
    }
}

impl<H: Host> Engine<H> {
    pub fn new(host: H, config: Config) -> Self {
        Engine{host, config}
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn context(&self) -> Result<QueryContext<'_>> {
        QueryContext::new(&self.host, &self.config)
    }

    /// Classify the block device with the given number
    pub fn resolve(&self, major: u32, minor: u32) -> Result<DeviceHandle> {
        Ok(self.context()?.resolve(major, minor))
    }

    /// Classify an open block device
    pub fn resolve_file(&self, file: &File) -> Result<DeviceHandle> {
        let ctx = self.context()?;
        DeviceHandle::from_file(file, &ctx.majors)
    }

    /// Would an I/O of `len` bytes at byte `offset` of `handle` touch any
    /// unrecoverable bad blocks?
    #[tracing::instrument(skip(self))]
    pub fn query(&self, handle: &DeviceHandle, offset: u64, len: u64,
                 dir: IoDir) -> QueryResult
    {
        let r = match self.context() {
            Ok(ctx) => request_range(offset, len, dir)
                .map_or_else(QueryResult::Error, |r| ctx.query(handle, r)),
            Err(e) => QueryResult::Error(e)
        };
        tracing::debug!("{r}");
        r
    }

    /// Like [`Engine::query`], for an open block device
    #[tracing::instrument(skip(self, file))]
    pub fn query_file(&self, file: &File, offset: u64, len: u64, dir: IoDir)
        -> QueryResult
    {
        let r = match self.context() {
            Ok(ctx) => match DeviceHandle::from_file(file, &ctx.majors) {
                Ok(handle) => request_range(offset, len, dir)
                    .map_or_else(QueryResult::Error, |r| ctx.query(&handle, r)),
                Err(e) => QueryResult::Error(e)
            },
            Err(e) => QueryResult::Error(e)
        };
        tracing::debug!("{r}");
        r
    }

    /// Returns 0 if an I/O to an open block device would be clear, 1 for a
    /// hit, and -1 if the answer is unknown.
    pub fn is_badblock(&self, file: &File, offset: u64, len: u64, dir: IoDir)
        -> i32
    {
        self.query_file(file, offset, len, dir).into()
    }

    /// Every unrecoverable range of the linear device-mapper volume named
    /// `volume`, in the volume's sectors.
    ///
    /// Fails if any array beneath the volume can't be examined.
    #[tracing::instrument(skip(self))]
    pub fn get_bad_ranges(&self, volume: &str) -> Result<Vec<BadRange>> {
        self.context()?
            .volume_bad_ranges(&DmDevice::Name(volume.to_owned()))
    }

    /// Geometry of the md array named `name`
    pub fn geometry(&self, name: &str) -> Result<ArrayGeometry> {
        ArrayGeometry::probe(&self.host, name, &self.config)
    }
}

// LCOV_EXCL_STOP
