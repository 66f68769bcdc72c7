// vim: tw=80
use function_name::named;
use pretty_assertions::assert_eq;

use badblk_core::{BadRange, Error};

use crate::util::*;

/// A volume made of the second half of md0 followed by the first half of md1
fn volume(name: &str) -> FakeSystem {
    let mut sys = FakeSystem::new(name);
    // 3-disk RAID5 with 64 KiB chunks: 256 logical sectors per stripe
    sys.array(0, "raid5", 65536, &[
        Some((2048, "2048 8\n2560 8\n")),
        Some((2048, "2048 8\n2560 8\n")),
        Some((2048, "2560 8\n")),
    ])
    // Degraded, so a single report is unrecoverable
    .array(1, "raid5", 65536, &[
        Some((0, "12 1\n")),
        None,
        Some((0, "")),
    ])
    .table(0, "vg0-data", &[
        (0, 4096, "linear", "9:0 4096"),
        (4096, 4096, "linear", "9:1 0"),
    ]);
    sys
}

#[named]
#[test_log::test]
fn two_arrays() {
    let mut sys = volume(function_name!());
    let engine = sys.engine();
    // md0's bad ranges all lie at logical sectors below 4096, which the
    // volume doesn't map.
    //
    // md1: member sector 8..16 is in stripe 0, logical 8..16 and 136..144,
    // rebased by +4096.
    assert_eq!(engine.get_bad_ranges("vg0-data").unwrap(), vec![
        BadRange::new(4104, 8),
        BadRange::new(4232, 8),
    ]);
}

#[named]
#[test]
fn visible_through_window() {
    let mut sys = volume(function_name!());
    sys.table(1, "vg0-whole", &[(0, 8192, "linear", "9:0 0")]);
    let engine = sys.engine();
    // Member sector 0..8 reported by two members: logical 0..8 and 128..136.
    // Member sector 512..520 reported by three: logical 1024..1032 and
    // 1152..1160.
    assert_eq!(engine.get_bad_ranges("vg0-whole").unwrap(), vec![
        BadRange::new(0, 8),
        BadRange::new(128, 8),
        BadRange::new(1024, 8),
        BadRange::new(1152, 8),
    ]);
}

/// Linear maps stacked on linear maps
#[named]
#[test]
fn nested() {
    let mut sys = volume(function_name!());
    sys.table(1, "vg1-top", &[(0, 4096, "linear", "253:0 4096")]);
    let engine = sys.engine();
    assert_eq!(engine.get_bad_ranges("vg1-top").unwrap(), vec![
        BadRange::new(8, 8),
        BadRange::new(136, 8),
    ]);
}

/// Adjacent projections are merged
#[named]
#[test]
fn coalesced() {
    let mut sys = FakeSystem::new(function_name!());
    sys.array(0, "raid5", 65536, &[
        Some((0, "120 16\n")),
        Some((0, "120 16\n")),
        Some((0, "")),
    ])
    .table(0, "vg0-lv0", &[(0, 1024, "linear", "9:0 0")]);
    let engine = sys.engine();
    // Member 120..128 projects to logical 120..128 and 248..256, while member
    // 128..136 projects to 256..264 and 384..392.
    assert_eq!(engine.get_bad_ranges("vg0-lv0").unwrap(), vec![
        BadRange::new(120, 8),
        BadRange::new(248, 16),
        BadRange::new(384, 8),
    ]);
}

/// One failed array fails the whole enumeration
#[named]
#[test]
fn partial_failure() {
    let mut sys = FakeSystem::new(function_name!());
    sys.array(0, "raid5", 65536, &[Some((0, "")); 3])
        .array(1, "raid5", 65536, &[Some((0, "")), None, None])
        .table(0, "vg0-lv0", &[
            (0, 1000, "linear", "9:0 0"),
            (1000, 1000, "linear", "9:1 0"),
        ]);
    let engine = sys.engine();
    assert_eq!(engine.get_bad_ranges("vg0-lv0"), Err(Error::ArrayFailed));
}

#[named]
#[test]
fn not_linear() {
    let mut sys = volume(function_name!());
    sys.table(1, "vg0-striped", &[(0, 8192, "striped", "2 128 9:0 0 9:1 0")]);
    let engine = sys.engine();
    assert_eq!(engine.get_bad_ranges("vg0-striped"),
               Err(Error::UnsupportedTopology));
}

#[named]
#[test]
fn no_such_volume() {
    let mut sys = volume(function_name!());
    let engine = sys.engine();
    assert_eq!(engine.get_bad_ranges("vg9-nothing"),
               Err(Error::TopologyUnavailable));
}
