//! Identity and system information queries
//!
//! Cheap, side-effect free calls. These are usually the fastest probes in a
//! run and make a good baseline for the rest.

use crate::fixtures::Fixtures;
use crate::probe::{check, Invocation, Probe, ProbeClass, ProbeResult};
use nix::errno::Errno;
use std::mem::MaybeUninit;

pub const PROBES: &[Probe] = &[
    Probe::new("getpid", ProbeClass::Info, getpid),
    Probe::new("getppid", ProbeClass::Info, getppid),
    Probe::new("gettid", ProbeClass::Info, gettid),
    Probe::new("getuid", ProbeClass::Info, getuid),
    Probe::new("geteuid", ProbeClass::Info, geteuid),
    Probe::new("getgid", ProbeClass::Info, getgid),
    Probe::new("getegid", ProbeClass::Info, getegid),
    Probe::new("getpgid", ProbeClass::Info, getpgid),
    Probe::new("getsid", ProbeClass::Info, getsid),
    Probe::new("getgroups", ProbeClass::Info, getgroups),
    Probe::new("getresuid", ProbeClass::Info, getresuid),
    Probe::new("getcpu", ProbeClass::Info, getcpu),
    Probe::new("uname", ProbeClass::Info, uname),
    Probe::new("sysinfo", ProbeClass::Info, sysinfo),
    Probe::new("getrlimit", ProbeClass::Info, getrlimit),
    Probe::new("prlimit64", ProbeClass::Info, prlimit64),
    Probe::new("getrusage", ProbeClass::Info, getrusage),
    Probe::new("getcwd", ProbeClass::Info, getcwd),
    Probe::new("umask", ProbeClass::Info, umask),
    Probe::new("getrandom", ProbeClass::Info, getrandom),
];

fn getpid(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    inv.timed(|| unsafe { libc::getpid() });
    Ok(())
}

fn getppid(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    inv.timed(|| unsafe { libc::getppid() });
    Ok(())
}

// glibc only grew a wrapper in 2.30
fn gettid(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    check(inv.timed(|| unsafe { libc::syscall(libc::SYS_gettid) }))
}

fn getuid(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    inv.timed(|| unsafe { libc::getuid() });
    Ok(())
}

fn geteuid(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    inv.timed(|| unsafe { libc::geteuid() });
    Ok(())
}

fn getgid(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    inv.timed(|| unsafe { libc::getgid() });
    Ok(())
}

fn getegid(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    inv.timed(|| unsafe { libc::getegid() });
    Ok(())
}

fn getpgid(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    check(inv.timed(|| unsafe { libc::getpgid(fx.pid) }))
}

fn getsid(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    check(inv.timed(|| unsafe { libc::getsid(fx.pid) }))
}

fn getgroups(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let mut groups = [0 as libc::gid_t; 64];
    let ret = inv.timed(|| unsafe { libc::getgroups(groups.len() as libc::c_int, groups.as_mut_ptr()) });
    match ret {
        // More than 64 supplementary groups; the size query still ran
        -1 if Errno::last() == Errno::EINVAL => Ok(()),
        ret => check(ret),
    }
}

fn getresuid(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let (mut r, mut e, mut s): (libc::uid_t, libc::uid_t, libc::uid_t) = (0, 0, 0);
    check(inv.timed(|| unsafe { libc::getresuid(&mut r, &mut e, &mut s) }))
}

fn getcpu(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let mut cpu: libc::c_uint = 0;
    let mut node: libc::c_uint = 0;
    check(inv.timed(|| unsafe {
        libc::syscall(
            libc::SYS_getcpu,
            &mut cpu as *mut libc::c_uint,
            &mut node as *mut libc::c_uint,
            std::ptr::null_mut::<libc::c_void>(),
        )
    }))
}

fn uname(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let mut buf = MaybeUninit::<libc::utsname>::uninit();
    check(inv.timed(|| unsafe { libc::uname(buf.as_mut_ptr()) }))
}

fn sysinfo(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let mut buf = MaybeUninit::<libc::sysinfo>::uninit();
    check(inv.timed(|| unsafe { libc::sysinfo(buf.as_mut_ptr()) }))
}

fn getrlimit(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let mut rlim = MaybeUninit::<libc::rlimit>::uninit();
    check(inv.timed(|| unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, rlim.as_mut_ptr()) }))
}

fn prlimit64(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let mut old = MaybeUninit::<libc::rlimit64>::uninit();
    check(inv.timed(|| unsafe {
        libc::prlimit64(0, libc::RLIMIT_STACK, std::ptr::null(), old.as_mut_ptr())
    }))
}

fn getrusage(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let mut usage = MaybeUninit::<libc::rusage>::uninit();
    check(inv.timed(|| unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) }))
}

fn getcwd(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let mut buf = [0 as libc::c_char; libc::PATH_MAX as usize];
    let ret = inv.timed(|| unsafe { libc::getcwd(buf.as_mut_ptr(), buf.len()) });
    if ret.is_null() {
        Err(Errno::last())
    } else {
        Ok(())
    }
}

fn umask(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let old = inv.timed(|| unsafe { libc::umask(0o077) });
    unsafe { libc::umask(old) };
    Ok(())
}

fn getrandom(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let mut buf = [0u8; 16];
    check(inv.timed(|| unsafe {
        libc::getrandom(buf.as_mut_ptr() as *mut libc::c_void, buf.len(), libc::GRND_NONBLOCK)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::testing::{exercise, exercise_all};

    #[test]
    fn test_info_probes() {
        exercise_all(PROBES);
    }

    #[test]
    fn test_getpid_always_succeeds() {
        let fx = Fixtures::new().unwrap();
        assert_eq!(exercise(&PROBES[0], &fx), Ok(()));
    }
}
