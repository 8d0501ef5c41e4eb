//! File and directory probes
//!
//! Everything happens inside the fixture temp directory, addressed through
//! the `*at()` family and the directory descriptor so no path has to be
//! built per call. Entries created for a probe are removed before it
//! returns, whether or not the timed call succeeded.

use crate::fixtures::{Fixtures, SCRATCH_FILE_SIZE};
use crate::probe::{check, Invocation, Probe, ProbeClass, ProbeResult};
use crate::probes::owned_fd;
use nix::errno::Errno;
use std::ffi::CStr;
use std::mem::MaybeUninit;
use std::os::fd::{AsRawFd, IntoRawFd, OwnedFd};

pub const PROBES: &[Probe] = &[
    Probe::new("openat", ProbeClass::File, openat),
    Probe::new("close", ProbeClass::File, close),
    Probe::new("creat", ProbeClass::File, creat),
    Probe::new("read", ProbeClass::File, read),
    Probe::new("write", ProbeClass::File, write),
    Probe::new("pread64", ProbeClass::File, pread64),
    Probe::new("pwrite64", ProbeClass::File, pwrite64),
    Probe::new("readv", ProbeClass::File, readv),
    Probe::new("lseek", ProbeClass::File, lseek),
    Probe::new("fstat", ProbeClass::File, fstat),
    Probe::new("newfstatat", ProbeClass::File, newfstatat),
    Probe::new("faccessat", ProbeClass::File, faccessat),
    Probe::new("fstatfs", ProbeClass::File, fstatfs),
    Probe::new("fsync", ProbeClass::File, fsync),
    Probe::new("fdatasync", ProbeClass::File, fdatasync),
    Probe::new("sync_file_range", ProbeClass::File, sync_file_range),
    Probe::new("dup", ProbeClass::File, dup),
    Probe::new("dup3", ProbeClass::File, dup3),
    Probe::new("fcntl", ProbeClass::File, fcntl),
    Probe::new("flock", ProbeClass::File, flock),
    Probe::new("ftruncate", ProbeClass::File, ftruncate),
    Probe::new("fallocate", ProbeClass::File, fallocate),
    Probe::new("fadvise64", ProbeClass::File, fadvise64),
    Probe::new("fchmod", ProbeClass::File, fchmod),
    Probe::new("fchown", ProbeClass::File, fchown),
    Probe::new("utimensat", ProbeClass::File, utimensat),
    Probe::new("getdents64", ProbeClass::File, getdents64),
    Probe::new("mkdirat", ProbeClass::File, mkdirat),
    Probe::new("rmdir", ProbeClass::File, rmdir),
    Probe::new("unlinkat", ProbeClass::File, unlinkat),
    Probe::new("renameat", ProbeClass::File, renameat),
    Probe::new("linkat", ProbeClass::File, linkat),
    Probe::new("symlinkat", ProbeClass::File, symlinkat),
    Probe::new("readlinkat", ProbeClass::File, readlinkat),
];

const SCRATCH: &CStr = c"scratch";
const IO_SIZE: usize = 64;
const MODE: libc::mode_t = 0o600;

fn open_scratch(fx: &Fixtures, flags: libc::c_int) -> Result<OwnedFd, Errno> {
    owned_fd(unsafe { libc::openat(fx.dir_fd(), SCRATCH.as_ptr(), flags | libc::O_CLOEXEC) })
}

/// Create (or reuse) an empty regular file
fn create(fx: &Fixtures, name: &CStr) -> ProbeResult {
    let flags = libc::O_CREAT | libc::O_WRONLY | libc::O_CLOEXEC;
    owned_fd(unsafe { libc::openat(fx.dir_fd(), name.as_ptr(), flags, MODE) }).map(drop)
}

fn remove(fx: &Fixtures, name: &CStr) {
    unsafe { libc::unlinkat(fx.dir_fd(), name.as_ptr(), 0) };
}

fn remove_dir(fx: &Fixtures, name: &CStr) {
    unsafe { libc::unlinkat(fx.dir_fd(), name.as_ptr(), libc::AT_REMOVEDIR) };
}

fn rewind(fx: &Fixtures) -> ProbeResult {
    check(unsafe { libc::lseek(fx.file_fd(), 0, libc::SEEK_SET) })
}

fn openat(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let fd = inv.timed(|| unsafe {
        libc::openat(fx.dir_fd(), SCRATCH.as_ptr(), libc::O_RDONLY | libc::O_CLOEXEC)
    });
    owned_fd(fd).map(drop)
}

fn close(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let fd = open_scratch(fx, libc::O_RDONLY)?.into_raw_fd();
    check(inv.timed(|| unsafe { libc::close(fd) }))
}

fn creat(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let name = c"creat";
    let flags = libc::O_CREAT | libc::O_EXCL | libc::O_WRONLY | libc::O_CLOEXEC;
    remove(fx, name);
    let fd = inv.timed(|| unsafe { libc::openat(fx.dir_fd(), name.as_ptr(), flags, MODE) });
    let result = owned_fd(fd).map(drop);
    remove(fx, name);
    result
}

fn read(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let mut buf = [0u8; IO_SIZE];
    rewind(fx)?;
    check(inv.timed(|| unsafe {
        libc::read(fx.file_fd(), buf.as_mut_ptr() as *mut libc::c_void, buf.len())
    }))
}

fn write(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let buf = [0xa5u8; IO_SIZE];
    rewind(fx)?;
    check(inv.timed(|| unsafe {
        libc::write(fx.file_fd(), buf.as_ptr() as *const libc::c_void, buf.len())
    }))
}

fn pread64(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let mut buf = [0u8; IO_SIZE];
    check(inv.timed(|| unsafe {
        libc::pread(fx.file_fd(), buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0)
    }))
}

fn pwrite64(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let buf = [0xa5u8; IO_SIZE];
    check(inv.timed(|| unsafe {
        libc::pwrite(fx.file_fd(), buf.as_ptr() as *const libc::c_void, buf.len(), 0)
    }))
}

fn readv(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let mut head = [0u8; IO_SIZE / 2];
    let mut tail = [0u8; IO_SIZE / 2];
    let iov = [
        libc::iovec {
            iov_base: head.as_mut_ptr() as *mut libc::c_void,
            iov_len: head.len(),
        },
        libc::iovec {
            iov_base: tail.as_mut_ptr() as *mut libc::c_void,
            iov_len: tail.len(),
        },
    ];
    rewind(fx)?;
    check(inv.timed(|| unsafe { libc::readv(fx.file_fd(), iov.as_ptr(), iov.len() as libc::c_int) }))
}

fn lseek(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    check(inv.timed(|| unsafe { libc::lseek(fx.file_fd(), 0, libc::SEEK_END) }))
}

fn fstat(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let mut st = MaybeUninit::<libc::stat>::uninit();
    check(inv.timed(|| unsafe { libc::fstat(fx.file_fd(), st.as_mut_ptr()) }))
}

fn newfstatat(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let mut st = MaybeUninit::<libc::stat>::uninit();
    check(inv.timed(|| unsafe {
        libc::fstatat(fx.dir_fd(), SCRATCH.as_ptr(), st.as_mut_ptr(), 0)
    }))
}

fn faccessat(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    check(inv.timed(|| unsafe {
        libc::faccessat(fx.dir_fd(), SCRATCH.as_ptr(), libc::R_OK | libc::W_OK, 0)
    }))
}

fn fstatfs(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let mut st = MaybeUninit::<libc::statfs>::uninit();
    check(inv.timed(|| unsafe { libc::fstatfs(fx.file_fd(), st.as_mut_ptr()) }))
}

fn fsync(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    check(inv.timed(|| unsafe { libc::fsync(fx.file_fd()) }))
}

fn fdatasync(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    check(inv.timed(|| unsafe { libc::fdatasync(fx.file_fd()) }))
}

fn sync_file_range(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    check(inv.timed(|| unsafe {
        libc::sync_file_range(fx.file_fd(), 0, 0, libc::SYNC_FILE_RANGE_WRITE)
    }))
}

fn dup(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let fd = inv.timed(|| unsafe { libc::dup(fx.file_fd()) });
    owned_fd(fd).map(drop)
}

fn dup3(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let target = owned_fd(unsafe { libc::dup(fx.file_fd()) })?;
    let raw = target.as_raw_fd();
    check(inv.timed(|| unsafe { libc::dup3(fx.file_fd(), raw, libc::O_CLOEXEC) }))
}

fn fcntl(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    check(inv.timed(|| unsafe { libc::fcntl(fx.file_fd(), libc::F_GETFL) }))
}

fn flock(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let ret = inv.timed(|| unsafe { libc::flock(fx.file_fd(), libc::LOCK_SH | libc::LOCK_NB) });
    let result = check(ret);
    unsafe { libc::flock(fx.file_fd(), libc::LOCK_UN) };
    result
}

fn ftruncate(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let len = SCRATCH_FILE_SIZE as libc::off_t;
    check(inv.timed(|| unsafe { libc::ftruncate(fx.file_fd(), len) }))
}

// The range is already allocated, so this does not grow the file
fn fallocate(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let len = SCRATCH_FILE_SIZE as libc::off_t;
    check(inv.timed(|| unsafe { libc::fallocate(fx.file_fd(), 0, 0, len) }))
}

// Returns the error number instead of setting errno
fn fadvise64(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let ret = inv.timed(|| unsafe {
        libc::posix_fadvise(fx.file_fd(), 0, 0, libc::POSIX_FADV_NORMAL)
    });
    match ret {
        0 => Ok(()),
        err => Err(Errno::from_raw(err)),
    }
}

fn fchmod(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    check(inv.timed(|| unsafe { libc::fchmod(fx.file_fd(), MODE) }))
}

fn fchown(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    check(inv.timed(|| unsafe { libc::fchown(fx.file_fd(), fx.uid, fx.gid) }))
}

fn utimensat(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    check(inv.timed(|| unsafe {
        libc::utimensat(fx.dir_fd(), SCRATCH.as_ptr(), std::ptr::null(), 0)
    }))
}

fn getdents64(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let flags = libc::O_RDONLY | libc::O_DIRECTORY | libc::O_CLOEXEC;
    let dir = owned_fd(unsafe { libc::openat(fx.dir_fd(), c".".as_ptr(), flags) })?;
    let mut buf = [0u8; 1024];
    check(inv.timed(|| unsafe {
        libc::syscall(
            libc::SYS_getdents64,
            dir.as_raw_fd() as libc::c_long,
            buf.as_mut_ptr(),
            buf.len(),
        )
    }))
}

fn mkdirat(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let name = c"mkdirat";
    remove_dir(fx, name);
    let ret = inv.timed(|| unsafe { libc::mkdirat(fx.dir_fd(), name.as_ptr(), 0o700) });
    let result = check(ret);
    remove_dir(fx, name);
    result
}

fn rmdir(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let name = c"rmdir";
    match check(unsafe { libc::mkdirat(fx.dir_fd(), name.as_ptr(), 0o700) }) {
        Ok(()) | Err(Errno::EEXIST) => {}
        Err(e) => return Err(e),
    }
    check(inv.timed(|| unsafe {
        libc::unlinkat(fx.dir_fd(), name.as_ptr(), libc::AT_REMOVEDIR)
    }))
}

fn unlinkat(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let name = c"unlinkat";
    create(fx, name)?;
    check(inv.timed(|| unsafe { libc::unlinkat(fx.dir_fd(), name.as_ptr(), 0) }))
}

fn renameat(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let (from, to) = (c"rename.from", c"rename.to");
    create(fx, from)?;
    let ret = inv.timed(|| unsafe {
        libc::renameat(fx.dir_fd(), from.as_ptr(), fx.dir_fd(), to.as_ptr())
    });
    remove(fx, from);
    remove(fx, to);
    check(ret)
}

fn linkat(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let name = c"linkat";
    remove(fx, name);
    let ret = inv.timed(|| unsafe {
        libc::linkat(fx.dir_fd(), SCRATCH.as_ptr(), fx.dir_fd(), name.as_ptr(), 0)
    });
    remove(fx, name);
    check(ret)
}

fn symlinkat(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let name = c"symlinkat";
    remove(fx, name);
    let ret = inv.timed(|| unsafe { libc::symlinkat(SCRATCH.as_ptr(), fx.dir_fd(), name.as_ptr()) });
    remove(fx, name);
    check(ret)
}

fn readlinkat(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let name = c"readlinkat";
    remove(fx, name);
    check(unsafe { libc::symlinkat(SCRATCH.as_ptr(), fx.dir_fd(), name.as_ptr()) })?;
    let mut buf = [0 as libc::c_char; 64];
    let ret = inv.timed(|| unsafe {
        libc::readlinkat(fx.dir_fd(), name.as_ptr(), buf.as_mut_ptr(), buf.len())
    });
    remove(fx, name);
    check(ret)
}
