// vim: tw=80
//! Device-mapper table retrieval
//!
//! Tables are read straight from the kernel with the `DM_TABLE_STATUS` ioctl
//! rather than by parsing the output of dmsetup(8).

use crate::types::*;
use cfg_if::cfg_if;
#[cfg(test)] use mockall::automock;
use std::path::{Path, PathBuf};
use super::{DmDevice, DmTarget};

/// Source of device-mapper tables
#[cfg_attr(test, automock)]
pub trait DmControl {
    fn table(&self, dev: &DmDevice) -> Result<Vec<DmTarget>>;
}

/// FFI definitions from `<linux/dm-ioctl.h>`.  The ioctls can't go in libc
/// because they use Nix's macros.
#[doc(hidden)]
#[allow(non_camel_case_types)]
mod ffi {
    pub const DM_NAME_LEN: usize = 128;
    pub const DM_UUID_LEN: usize = 129;
    pub const DM_VERSION: [u32; 3] = [4, 0, 0];
    pub const DM_STATUS_TABLE_FLAG: u32 = 1 << 4;
    pub const DM_BUFFER_FULL_FLAG: u32 = 1 << 8;

    #[repr(C)]
    #[derive(Clone, Copy)]
    pub struct dm_ioctl {
        pub version: [u32; 3],
        pub data_size: u32,
        pub data_start: u32,
        pub target_count: u32,
        pub open_count: i32,
        pub flags: u32,
        pub event_nr: u32,
        pub padding: u32,
        pub dev: u64,
        pub name: [u8; DM_NAME_LEN],
        pub uuid: [u8; DM_UUID_LEN],
        pub data: [u8; 7],
    }

    /// Size of `struct dm_target_spec`, which precedes each target's
    /// parameter string: sector_start, length, status, next, target_type[16].
    pub const DM_TARGET_SPEC_LEN: usize = 8 + 8 + 4 + 4 + 16;

    #[cfg(target_os = "linux")]
    nix::ioctl_readwrite! {
        #[doc(hidden)]
        dm_table_status, 0xfd, 12, dm_ioctl
    }
}

/// Encode a device number the way the kernel's `huge_decode_dev` expects it.
fn encode_dev(major: u32, minor: u32) -> u64 {
    let major = u64::from(major);
    let minor = u64::from(minor);
    (minor & 0xff) | (major << 8) | ((minor & !0xff) << 12)
}

fn read_u32(buf: &[u8], at: usize) -> Option<u32> {
    let bytes = buf.get(at..at + 4)?;
    Some(u32::from_ne_bytes(bytes.try_into().ok()?))
}

fn read_u64(buf: &[u8], at: usize) -> Option<u64> {
    let bytes = buf.get(at..at + 8)?;
    Some(u64::from_ne_bytes(bytes.try_into().ok()?))
}

/// Read a NUL-terminated string that must lie within `buf`
fn read_cstr(buf: &[u8]) -> Option<String> {
    let nul = buf.iter().position(|b| *b == 0)?;
    String::from_utf8(buf[..nul].to_vec()).ok()
}

/// Decode the target specs that the kernel wrote into the data area of a
/// `DM_TABLE_STATUS` reply.
///
/// `data` starts at the reply's `data_start`.  Each spec's `next` field is the
/// offset of the following spec, relative to the start of `data`.
pub(super) fn parse_table(data: &[u8], target_count: u32)
    -> Result<Vec<DmTarget>>
{
    let mut targets = Vec::with_capacity(target_count as usize);
    let mut at = 0usize;
    for _ in 0..target_count {
        let spec = data.get(at..at + ffi::DM_TARGET_SPEC_LEN)
            .ok_or(Error::TopologyUnavailable)?;
        let start = read_u64(spec, 0).ok_or(Error::TopologyUnavailable)?;
        let length = read_u64(spec, 8).ok_or(Error::TopologyUnavailable)?;
        let next = read_u32(spec, 20).ok_or(Error::TopologyUnavailable)?;
        let mut ttype = spec[24..40].to_vec();
        ttype.push(0);
        let target_type = read_cstr(&ttype)
            .ok_or(Error::TopologyUnavailable)?;
        let params = data.get(at + ffi::DM_TARGET_SPEC_LEN..)
            .and_then(read_cstr)
            .ok_or(Error::TopologyUnavailable)?;
        targets.push(DmTarget{start, length, target_type, params});
        let next = next as usize;
        if next <= at && targets.len() < target_count as usize {
            // The kernel always moves forward.  Anything else would loop.
            return Err(Error::TopologyUnavailable);
        }
        at = next;
    }
    Ok(targets)
}

/// Reads tables from the device-mapper control node
#[derive(Clone, Debug)]
pub struct DmIoctl {
    control: PathBuf
}

impl DmIoctl {
    /// Initial reply buffer size.  Doubled whenever the kernel says it's too
    /// small.
    const INITIAL_BUFSIZE: usize = 16 << 10;
    const MAX_BUFSIZE: usize = 16 << 20;

    pub fn new<P: AsRef<Path>>(control: P) -> Self {
        DmIoctl{control: control.as_ref().to_owned()}
    }

    fn header(dev: &DmDevice, bufsize: usize) -> Result<ffi::dm_ioctl> {
        let mut hdr = ffi::dm_ioctl {
            version: ffi::DM_VERSION,
            data_size: u32::try_from(bufsize)
                .map_err(|_| Error::TopologyUnavailable)?,
            data_start: std::mem::size_of::<ffi::dm_ioctl>() as u32,
            target_count: 0,
            open_count: 0,
            flags: ffi::DM_STATUS_TABLE_FLAG,
            event_nr: 0,
            padding: 0,
            dev: 0,
            name: [0; ffi::DM_NAME_LEN],
            uuid: [0; ffi::DM_UUID_LEN],
            data: [0; 7],
        };
        match dev {
            DmDevice::Number{major, minor} => {
                hdr.dev = encode_dev(*major, *minor);
            }
            DmDevice::Name(name) => {
                let bytes = name.as_bytes();
                if bytes.is_empty() || bytes.len() >= ffi::DM_NAME_LEN {
                    return Err(Error::TopologyUnavailable);
                }
                hdr.name[..bytes.len()].copy_from_slice(bytes);
            }
        }
        Ok(hdr)
    }
}

cfg_if! {
    if #[cfg(target_os = "linux")] {
        impl DmControl for DmIoctl {
            #[tracing::instrument(skip(self))]
            fn table(&self, dev: &DmDevice) -> Result<Vec<DmTarget>> {
                use std::{fs::OpenOptions, mem, os::unix::io::AsRawFd, slice};

                let control = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .open(&self.control)
                    .map_err(|e| {
                        tracing::warn!("cannot open {}: {e}",
                                       self.control.display());
                        Error::TopologyUnavailable
                    })?;
                let hdrlen = mem::size_of::<ffi::dm_ioctl>();
                let mut bufsize = Self::INITIAL_BUFSIZE;
                loop {
                    // Use u64 storage so the header is suitably aligned
                    let mut buf = vec![0u64; bufsize / 8];
                    let hdr = Self::header(dev, bufsize)?;
                    let p = buf.as_mut_ptr() as *mut ffi::dm_ioctl;
                    // Safe because buf is aligned and larger than the header
                    let reply = unsafe {
                        p.write(hdr);
                        ffi::dm_table_status(control.as_raw_fd(), p)
                            .map_err(|e| {
                                tracing::debug!("DM_TABLE_STATUS: {e}");
                                Error::TopologyUnavailable
                            })?;
                        p.read()
                    };
                    if reply.flags & ffi::DM_BUFFER_FULL_FLAG != 0 {
                        bufsize *= 2;
                        if bufsize > Self::MAX_BUFSIZE {
                            return Err(Error::TopologyUnavailable);
                        }
                        continue;
                    }
                    let bytes = unsafe {
                        slice::from_raw_parts(buf.as_ptr() as *const u8,
                                              bufsize)
                    };
                    let data_start = reply.data_start as usize;
                    let data_end = (reply.data_size as usize).min(bufsize);
                    if data_start < hdrlen || data_start > data_end {
                        return Err(Error::TopologyUnavailable);
                    }
                    return parse_table(&bytes[data_start..data_end],
                                       reply.target_count);
                }
            }
        }
    } else {
        impl DmControl for DmIoctl {
            fn table(&self, _dev: &DmDevice) -> Result<Vec<DmTarget>> {
                // device-mapper only exists on Linux
                Err(Error::MetadataUnavailable)
            }
        }
    }
}

// LCOV_EXCL_STOP
