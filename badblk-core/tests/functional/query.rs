// vim: tw=80
use function_name::named;
use pretty_assertions::assert_eq;
use rstest::rstest;

use badblk_core::{
    Error,
    IoDir,
    MD_MAJOR,
    QueryResult,
    geometry::RaidLevel,
    topology::DeviceKind,
};

use crate::util::*;

/// Bytes per sector
const S: u64 = 512;

/// 6-disk RAID6, 64 KiB chunks, one member missing
fn raid6_degraded(name: &str, bad1: &'static str, bad3: &'static str)
    -> FakeSystem
{
    let mut sys = FakeSystem::new(name);
    sys.array(0, "raid6", 65536, &[
        Some((2048, "")),
        Some((2048, bad1)),
        None,
        Some((2048, bad3)),
        Some((2048, "")),
        Some((2048, "")),
    ]);
    sys
}

/// One additional bad member is within the margin of a degraded RAID6, but a
/// second one at the same page is not.
#[named]
#[rstest]
#[case("3048 16\n", "", QueryResult::Clear)]
#[case("3048 16\n", "3056 8\n", QueryResult::Hit)]
#[case("3048 16\n", "3064 8\n", QueryResult::Clear)]
#[test_log::test]
fn raid6_end_to_end(#[case] bad1: &'static str, #[case] bad3: &'static str,
                    #[case] expected: QueryResult)
{
    let mut sys = raid6_degraded(function_name!(), bad1, bad3);
    let engine = sys.engine();
    let h = engine.resolve(MD_MAJOR, 0).unwrap();
    assert_eq!(h.kind, DeviceKind::Array);
    // Member sector 1000 lies in stripe 7, logical sectors 3584..4096
    assert_eq!(engine.query(&h, 3584 * S, 512 * S, IoDir::Read), expected);
    assert_eq!(engine.query(&h, 0, 3584 * S, IoDir::Write),
               QueryResult::Clear);
}

#[named]
#[test]
fn failed_array() {
    let mut sys = FakeSystem::new(function_name!());
    sys.array(0, "raid5", 65536, &[Some((0, "")), None, None, Some((0, ""))]);
    let engine = sys.engine();
    let h = engine.resolve(MD_MAJOR, 0).unwrap();
    assert_eq!(engine.query(&h, 0, 4096, IoDir::Read),
               QueryResult::Error(Error::ArrayFailed));
}

#[named]
#[test]
fn unsupported_level() {
    let mut sys = FakeSystem::new(function_name!());
    sys.array(0, "raid10", 65536, &[Some((0, "")); 4]);
    let engine = sys.engine();
    let h = engine.resolve(MD_MAJOR, 0).unwrap();
    assert_eq!(engine.query(&h, 0, 4096, IoDir::Read),
               QueryResult::Error(Error::UnsupportedLevel(10)));
}

/// A faulty member contributes nothing
#[named]
#[test]
fn faulty_member() {
    let mut sys = FakeSystem::new(function_name!());
    sys.array(0, "raid5", 65536, &[
        Some((0, "64 8\n")),
        Some((0, "64 8\n")),
        Some((0, "")),
    ]);
    let engine = sys.engine();
    let h = engine.resolve(MD_MAJOR, 0).unwrap();
    assert_eq!(engine.query(&h, 64 * S, 8 * S, IoDir::Read), QueryResult::Hit);

    sys.member_attr(0, 1, "state", "faulty\n");
    let engine = sys.engine();
    assert_eq!(engine.query(&h, 64 * S, 8 * S, IoDir::Read),
               QueryResult::Clear);
}

/// Both bad block lists are read, and one missing doesn't stop the other
#[named]
#[test]
fn unacknowledged() {
    let mut sys = FakeSystem::new(function_name!());
    sys.array(0, "raid5", 65536, &[
        Some((0, "64 8\n")),
        Some((0, "")),
        Some((0, "")),
    ]);
    sys.member_attr(0, 1, "unacknowledged_bad_blocks", "64 8\n")
        .remove_member_attr(0, 1, "bad_blocks");
    let engine = sys.engine();
    let h = engine.resolve(MD_MAJOR, 0).unwrap();
    assert_eq!(engine.query(&h, 64 * S, 4096, IoDir::Read), QueryResult::Hit);
}

/// A member with an unreadable data offset contributes nothing
#[named]
#[test]
fn bad_offset() {
    let mut sys = FakeSystem::new(function_name!());
    sys.array(0, "raid5", 65536, &[
        Some((0, "64 8\n")),
        Some((0, "64 8\n")),
        Some((0, "")),
    ]);
    sys.member_attr(0, 1, "offset", "garbage\n");
    let engine = sys.engine();
    let h = engine.resolve(MD_MAJOR, 0).unwrap();
    assert_eq!(engine.query(&h, 64 * S, 4096, IoDir::Read),
               QueryResult::Clear);
}

/// A report that runs off the end of the address space is ignored, and the
/// rest of the list still counts
#[named]
#[test]
fn unaddressable_report() {
    let mut sys = FakeSystem::new(function_name!());
    sys.array(0, "raid5", 65536, &[
        Some((0, "18446744073709551608 16\n64 8\n")),
        Some((0, "64 8\n18446744073709551612 2\n")),
        Some((0, "")),
    ]);
    let engine = sys.engine();
    let h = engine.resolve(MD_MAJOR, 0).unwrap();
    assert_eq!(engine.query(&h, 64 * S, 4096, IoDir::Read), QueryResult::Hit);
    assert_eq!(engine.query(&h, 0, 64 * S, IoDir::Read), QueryResult::Clear);
    assert_eq!(engine.query(&h, u64::MAX - 100, 4096, IoDir::Read),
               QueryResult::Error(Error::TopologyUnavailable));
}

/// Mirrors have no chunk size of their own
#[named]
#[test]
fn mirror() {
    let mut sys = FakeSystem::new(function_name!());
    sys.array(0, "raid1", 0, &[
        Some((0, "5000 8\n")),
        Some((0, "5000 8\nbogus line\n")),
    ]);
    let engine = sys.engine();
    let geom = engine.geometry("md0").unwrap();
    assert_eq!(geom.level, RaidLevel::Mirror);
    assert_eq!(geom.chunk_sectors, 128);
    assert_eq!(geom.max_tolerable_loss, 1);
    let h = engine.resolve(MD_MAJOR, 0).unwrap();
    assert_eq!(engine.query(&h, 5000 * S, 512, IoDir::Read), QueryResult::Hit);
    assert_eq!(engine.query(&h, 5008 * S, 4096, IoDir::Read),
               QueryResult::Clear);
}

mod linear {
    use pretty_assertions::assert_eq;
    use super::*;

    fn two_arrays(name: &str) -> FakeSystem {
        let mut sys = FakeSystem::new(name);
        sys.array(0, "raid5", 65536, &[Some((0, "")); 3])
            .array(1, "raid5", 65536, &[
                Some((2048, "2048 8\n")),
                Some((2048, "2048 8\n")),
                Some((2048, "")),
            ])
            .table(0, "vg0-lv0", &[
                (0, 1000, "linear", "9:0 0"),
                (1000, 1000, "linear", "9:1 0"),
            ]);
        sys
    }

    /// A request that straddles two targets examines both arrays
    #[named]
    #[test]
    fn straddle() {
        let mut sys = two_arrays(function_name!());
        let engine = sys.engine();
        let h = engine.resolve(DM_MAJOR, 0).unwrap();
        assert_eq!(h.kind, DeviceKind::LinearMap);
        assert_eq!(engine.query(&h, 996 * S, 8 * S, IoDir::Read),
                   QueryResult::Hit);
        assert_eq!(engine.query(&h, 0, 1000 * S, IoDir::Read),
                   QueryResult::Clear);
    }

    #[named]
    #[test]
    fn striped() {
        let mut sys = two_arrays(function_name!());
        sys.table(1, "vg0-lv1", &[(0, 2000, "striped", "2 128 9:0 0 9:1 0")]);
        let engine = sys.engine();
        let h = engine.resolve(DM_MAJOR, 1).unwrap();
        assert_eq!(engine.query(&h, 0, 4096, IoDir::Read),
                   QueryResult::Error(Error::UnsupportedTopology));
    }

    #[named]
    #[test]
    fn partitioned_array() {
        let mut sys = two_arrays(function_name!());
        let engine = sys.engine();
        let h = engine.resolve(MDP_MAJOR, 1).unwrap();
        assert_eq!(engine.query(&h, 0, 4096, IoDir::Read),
                   QueryResult::Error(Error::UnsupportedTopology));
    }

    #[named]
    #[test]
    fn missing_table() {
        let mut sys = two_arrays(function_name!());
        let engine = sys.engine();
        let h = engine.resolve(DM_MAJOR, 5).unwrap();
        assert_eq!(engine.query(&h, 0, 4096, IoDir::Read),
                   QueryResult::Error(Error::TopologyUnavailable));
    }
}

/// Only block devices can be queried
#[named]
#[test]
fn not_a_block_device() {
    let mut sys = FakeSystem::new(function_name!());
    let engine = sys.engine();
    let f = tempfile::tempfile().unwrap();
    assert_eq!(engine.is_badblock(&f, 0, 4096, IoDir::Read), -1);
}
