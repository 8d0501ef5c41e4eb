//! Probe registry
//!
//! Each family module exports a `PROBES` table; `registry()` concatenates
//! them in a fixed order. The order only matters for calibration, after
//! which the shuffle engine decides who runs when.

use crate::probe::{check, Probe};
use nix::errno::Errno;
use std::os::fd::{FromRawFd, OwnedFd};

pub mod file;
pub mod info;
pub mod ipc;
pub mod memory;
pub mod process;
pub mod signal;
pub mod time;

/// Every probe available on this platform
pub fn registry() -> Vec<Probe> {
    [
        info::PROBES,
        time::PROBES,
        file::PROBES,
        memory::PROBES,
        ipc::PROBES,
        signal::PROBES,
        process::PROBES,
    ]
    .concat()
}

/// Look up a probe by name
pub fn find(name: &str) -> Option<Probe> {
    registry().into_iter().find(|p| p.name == name)
}

/// Take ownership of a descriptor returned by a raw call, closing it on drop
pub(crate) fn owned_fd(ret: libc::c_int) -> Result<OwnedFd, Errno> {
    check(ret)?;
    Ok(unsafe { OwnedFd::from_raw_fd(ret) })
}
