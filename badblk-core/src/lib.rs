// vim: tw=80
//! Translates member-disk bad block reports into the logical address space of
//! the devices stacked on top of md arrays.

// Disable the range_plus_one lint.  Half-open sector ranges are the natural
// currency here.
#![allow(clippy::range_plus_one)]

// I suppose I should probably fix this some day, but I just don't like the look
// of e.g. "Raid" as opposed to "RAID".
#![allow(clippy::upper_case_acronyms)]

pub mod aggregator;
pub mod bitmap;
pub mod config;
pub mod geometry;
pub mod host;
pub mod member;
pub mod query;
pub mod registry;
pub mod topology;
pub mod types;
pub mod util;

pub use crate::config::Config;
pub use crate::query::Engine;
pub use crate::types::*;
pub use crate::util::*;
