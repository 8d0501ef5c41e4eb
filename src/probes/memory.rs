//! Mapping and page-state probes
//!
//! Calls that only inspect or re-assert page state operate on the two
//! fixture pages. Calls that create or destroy mappings use a private
//! anonymous page of their own.

use crate::fixtures::Fixtures;
use crate::probe::{check, Invocation, Probe, ProbeClass, ProbeResult};
use crate::probes::owned_fd;
use nix::errno::Errno;

pub const PROBES: &[Probe] = &[
    Probe::new("mmap", ProbeClass::Memory, mmap),
    Probe::new("munmap", ProbeClass::Memory, munmap),
    Probe::new("mremap", ProbeClass::Memory, mremap),
    Probe::new("mprotect", ProbeClass::Memory, mprotect),
    Probe::new("madvise", ProbeClass::Memory, madvise),
    Probe::new("mincore", ProbeClass::Memory, mincore),
    Probe::new("msync", ProbeClass::Memory, msync),
    Probe::new("mlock", ProbeClass::Memory, mlock),
    Probe::new("munlock", ProbeClass::Memory, munlock),
    Probe::new("brk", ProbeClass::Memory, brk),
    Probe::new("memfd_create", ProbeClass::Memory, memfd_create),
];

/// Anonymous private mapping, unmapped on drop
struct AnonMap {
    ptr: *mut libc::c_void,
    len: usize,
}

impl AnonMap {
    fn new(len: usize) -> Result<Self, Errno> {
        Self::from_raw(unsafe { map_anon(len) }, len)
    }

    fn from_raw(ptr: *mut libc::c_void, len: usize) -> Result<Self, Errno> {
        if ptr == libc::MAP_FAILED {
            Err(Errno::last())
        } else {
            Ok(Self { ptr, len })
        }
    }

    /// Give up ownership without unmapping
    fn leak(self) -> *mut libc::c_void {
        let ptr = self.ptr;
        std::mem::forget(self);
        ptr
    }
}

impl Drop for AnonMap {
    fn drop(&mut self) {
        unsafe { libc::munmap(self.ptr, self.len) };
    }
}

unsafe fn map_anon(len: usize) -> *mut libc::c_void {
    unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    }
}

fn mmap(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let ptr = inv.timed(|| unsafe { map_anon(fx.page_size) });
    AnonMap::from_raw(ptr, fx.page_size).map(drop)
}

fn munmap(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let map = AnonMap::new(fx.page_size)?;
    let len = map.len;
    let ptr = map.leak();
    check(inv.timed(|| unsafe { libc::munmap(ptr, len) }))
}

fn mremap(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let map = AnonMap::new(fx.page_size)?;
    let grown = fx.page_size * 2;
    let ptr = inv.timed(|| unsafe {
        libc::mremap(map.ptr, map.len, grown, libc::MREMAP_MAYMOVE)
    });
    if ptr == libc::MAP_FAILED {
        return Err(Errno::last());
    }
    // The old range is gone; only the new one needs unmapping
    map.leak();
    drop(AnonMap { ptr, len: grown });
    Ok(())
}

fn mprotect(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    check(inv.timed(|| unsafe {
        libc::mprotect(fx.pages_ptr(), fx.page_size, libc::PROT_READ | libc::PROT_WRITE)
    }))
}

fn madvise(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    check(inv.timed(|| unsafe {
        libc::madvise(fx.pages_ptr(), fx.pages_len(), libc::MADV_NORMAL)
    }))
}

fn mincore(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let mut vec = [0u8; 2];
    check(inv.timed(|| unsafe {
        libc::mincore(fx.pages_ptr(), fx.pages_len(), vec.as_mut_ptr())
    }))
}

fn msync(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    check(inv.timed(|| unsafe { libc::msync(fx.pages_ptr(), fx.page_size, libc::MS_ASYNC) }))
}

fn mlock(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let ret = inv.timed(|| unsafe { libc::mlock(fx.pages_ptr(), fx.page_size) });
    check(ret)?;
    unsafe { libc::munlock(fx.pages_ptr(), fx.page_size) };
    Ok(())
}

fn munlock(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    check(unsafe { libc::mlock(fx.pages_ptr(), fx.page_size) })?;
    check(inv.timed(|| unsafe { libc::munlock(fx.pages_ptr(), fx.page_size) }))
}

// brk(0) reports the current break without moving it
fn brk(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    check(inv.timed(|| unsafe { libc::syscall(libc::SYS_brk, 0 as libc::c_long) }))
}

fn memfd_create(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let fd = inv.timed(|| unsafe { libc::memfd_create(c"sysrank".as_ptr(), libc::MFD_CLOEXEC) });
    owned_fd(fd).map(drop)
}
