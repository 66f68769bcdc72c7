// vim: tw=80
//! Parsers for the procfs files that describe block device numbering

use super::DriverMajors;

/// Parse `/proc/devices`, looking for the dynamically assigned block majors of
/// device-mapper and partitioned md.
///
/// Only the "Block devices:" section is considered; character majors share
/// the same namespace of names but not of numbers.
pub fn parse_devices(s: &str) -> DriverMajors {
    let mut majors = DriverMajors::default();
    let mut in_block = false;
    for line in s.lines() {
        let line = line.trim();
        if line.ends_with(':') {
            in_block = line == "Block devices:";
            continue;
        }
        if !in_block {
            continue;
        }
        let mut fields = line.split_whitespace();
        let (Some(major), Some(name)) = (fields.next(), fields.next()) else {
            continue;
        };
        let Ok(major) = major.parse::<u32>() else {
            continue;
        };
        match name {
            "device-mapper" => majors.device_mapper = Some(major),
            "mdp" => majors.mdp = Some(major),
            _ => ()
        }
    }
    majors
}

/// Find the name of device `major:minor` in `/proc/partitions`.
pub fn parse_partitions(s: &str, major: u32, minor: u32) -> Option<String> {
    s.lines()
        .filter_map(|line| {
            let fields = line.split_whitespace().collect::<Vec<_>>();
            if fields.len() != 4 {
                return None;
            }
            let maj = fields[0].parse::<u32>().ok()?;
            let min = fields[1].parse::<u32>().ok()?;
            fields[2].parse::<u64>().ok()?;
            Some((maj, min, fields[3]))
        }).find(|(maj, min, _)| *maj == major && *min == minor)
        .map(|(_, _, name)| name.to_owned())
}

// LCOV_EXCL_STOP
