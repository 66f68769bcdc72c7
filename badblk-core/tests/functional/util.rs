// vim: tw=80
//! A fake storage stack: sysfs and procfs trees in a temporary directory, and
//! device-mapper tables held in memory.

use std::{
    fmt::Write as _,
    fs,
    path::Path,
};

use tempfile::{Builder, TempDir};

use badblk_core::{
    Engine,
    Error,
    MD_MAJOR,
    Result,
    config::Config,
    host::{DmControl, DmDevice, DmTarget, LiveHost},
};

pub const DM_MAJOR: u32 = 253;
pub const MDP_MAJOR: u32 = 254;

const DEVICES: &str = "Character devices:
  1 mem
  4 tty
254 device-mapper

Block devices:
  8 sd
  9 md
253 device-mapper
254 mdp
259 blkext
";

/// One member of a fake array: its data offset and its acknowledged bad
/// block list.  `None` for a missing member.
pub type Member<'a> = Option<(u64, &'a str)>;

struct Table {
    minor: u32,
    name: String,
    rows: Vec<DmTarget>,
}

/// Serves device-mapper tables from memory
struct TableDm(Vec<Table>);

impl DmControl for TableDm {
    fn table(&self, dev: &DmDevice) -> Result<Vec<DmTarget>> {
        self.0.iter()
            .find(|t| match dev {
                DmDevice::Number{major, minor} =>
                    *major == DM_MAJOR && *minor == t.minor,
                DmDevice::Name(name) => *name == t.name
            }).map(|t| t.rows.clone())
            .ok_or(Error::TopologyUnavailable)
    }
}

pub struct FakeSystem {
    pub tempdir: TempDir,
    partitions: Vec<(u32, u32, String)>,
    tables: Vec<Table>,
}

impl FakeSystem {
    pub fn new(prefix: &str) -> Self {
        let tempdir = Builder::new()
            .prefix(prefix)
            .tempdir()
            .unwrap();
        let sys = FakeSystem {
            tempdir,
            partitions: Vec::new(),
            tables: Vec::new()
        };
        sys.write("proc/devices", DEVICES);
        sys
    }

    fn write<P: AsRef<Path>>(&self, rel: P, contents: &str) {
        let path = self.tempdir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    /// Add md array `md<minor>`.  Its size is nominal.
    pub fn array(&mut self, minor: u32, level: &str, chunk_bytes: u64,
                 members: &[Member]) -> &mut Self
    {
        let name = format!("md{minor}");
        let md = format!("sys/block/{name}/md");
        let degraded = members.iter().filter(|m| m.is_none()).count();
        self.write(format!("{md}/level"), &format!("{level}\n"));
        self.write(format!("{md}/raid_disks"), &format!("{}\n", members.len()));
        self.write(format!("{md}/degraded"), &format!("{degraded}\n"));
        self.write(format!("{md}/chunk_size"), &format!("{chunk_bytes}\n"));
        for (i, m) in members.iter().enumerate() {
            if let Some((offset, bad)) = m {
                let rd = format!("{md}/rd{i}");
                self.write(format!("{rd}/state"), "in_sync\n");
                self.write(format!("{rd}/offset"), &format!("{offset}\n"));
                self.write(format!("{rd}/bad_blocks"), bad);
                self.write(format!("{rd}/unacknowledged_bad_blocks"), "");
            }
        }
        self.partitions.push((MD_MAJOR, minor, name));
        self
    }

    /// Overwrite one attribute of one member
    pub fn member_attr(&mut self, minor: u32, idx: u32, attr: &str,
                       contents: &str) -> &mut Self
    {
        self.write(format!("sys/block/md{minor}/md/rd{idx}/{attr}"), contents);
        self
    }

    /// Remove one attribute of one member
    pub fn remove_member_attr(&mut self, minor: u32, idx: u32, attr: &str)
        -> &mut Self
    {
        let path = self.tempdir.path()
            .join(format!("sys/block/md{minor}/md/rd{idx}/{attr}"));
        fs::remove_file(path).unwrap();
        self
    }

    /// Add a device-mapper device with the given table rows
    pub fn table(&mut self, minor: u32, name: &str,
                 rows: &[(u64, u64, &str, &str)]) -> &mut Self
    {
        let rows = rows.iter()
            .map(|(start, length, ttype, params)| DmTarget {
                start: *start,
                length: *length,
                target_type: (*ttype).to_owned(),
                params: (*params).to_owned()
            }).collect();
        self.tables.push(Table{minor, name: name.to_owned(), rows});
        self.partitions.push((DM_MAJOR, minor, format!("dm-{minor}")));
        self
    }

    pub fn config(&self) -> Config {
        Config {
            sysfs_root: self.tempdir.path().join("sys"),
            procfs_root: self.tempdir.path().join("proc"),
            .. Default::default()
        }
    }

    /// An engine that examines this fake system
    pub fn engine(&mut self) -> Engine<LiveHost> {
        let mut partitions = String::from("major minor  #blocks  name\n\n");
        for (major, minor, name) in self.partitions.iter() {
            writeln!(partitions, "{major:4} {minor:7} {:10} {name}", 1 << 20)
                .unwrap();
        }
        self.write("proc/partitions", &partitions);
        let tables = self.tables.drain(..).collect();
        let config = self.config();
        let host = LiveHost::with_dm_control(&config, Box::new(TableDm(tables)));
        Engine::new(host, config)
    }
}
