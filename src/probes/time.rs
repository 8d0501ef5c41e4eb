//! Clocks, timers and sleeps

use crate::fixtures::Fixtures;
use crate::probe::{check, Invocation, Probe, ProbeClass, ProbeResult};
use crate::probes::owned_fd;
use nix::errno::Errno;
use std::mem::MaybeUninit;
use std::os::fd::AsRawFd;

pub const PROBES: &[Probe] = &[
    Probe::new("clock_gettime", ProbeClass::Time, clock_gettime),
    Probe::new("clock_getres", ProbeClass::Time, clock_getres),
    Probe::new("gettimeofday", ProbeClass::Time, gettimeofday),
    Probe::new("time", ProbeClass::Time, time),
    Probe::new("times", ProbeClass::Time, times),
    Probe::new("nanosleep", ProbeClass::Time, nanosleep),
    Probe::new("clock_nanosleep", ProbeClass::Time, clock_nanosleep),
    Probe::new("getitimer", ProbeClass::Time, getitimer),
    Probe::new("adjtimex", ProbeClass::Time, adjtimex),
    Probe::new("timerfd_create", ProbeClass::Time, timerfd_create),
    Probe::new("timerfd_settime", ProbeClass::Time, timerfd_settime),
    Probe::new("timer_create", ProbeClass::Time, timer_create),
];

// Shortest sleep the kernel will honour without returning immediately
const SHORT_SLEEP: libc::timespec = libc::timespec {
    tv_sec: 0,
    tv_nsec: 1,
};

// Through the raw syscall, so the vDSO fast path is not what gets timed
fn clock_gettime(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let mut ts = MaybeUninit::<libc::timespec>::uninit();
    check(inv.timed(|| unsafe {
        libc::syscall(
            libc::SYS_clock_gettime,
            libc::CLOCK_MONOTONIC as libc::c_long,
            ts.as_mut_ptr(),
        )
    }))
}

fn clock_getres(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let mut ts = MaybeUninit::<libc::timespec>::uninit();
    check(inv.timed(|| unsafe { libc::clock_getres(libc::CLOCK_REALTIME, ts.as_mut_ptr()) }))
}

fn gettimeofday(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let mut tv = MaybeUninit::<libc::timeval>::uninit();
    check(inv.timed(|| unsafe { libc::gettimeofday(tv.as_mut_ptr(), std::ptr::null_mut()) }))
}

fn time(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    check(inv.timed(|| unsafe { libc::time(std::ptr::null_mut()) }))
}

fn times(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let mut buf = MaybeUninit::<libc::tms>::uninit();
    check(inv.timed(|| unsafe { libc::times(buf.as_mut_ptr()) }))
}

fn nanosleep(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    check(inv.timed(|| unsafe { libc::nanosleep(&SHORT_SLEEP, std::ptr::null_mut()) }))
}

// Returns the error number instead of setting errno
fn clock_nanosleep(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let ret = inv.timed(|| unsafe {
        libc::clock_nanosleep(libc::CLOCK_MONOTONIC, 0, &SHORT_SLEEP, std::ptr::null_mut())
    });
    match ret {
        0 => Ok(()),
        err => Err(Errno::from_raw(err)),
    }
}

fn getitimer(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let mut value = MaybeUninit::<libc::itimerval>::uninit();
    check(inv.timed(|| unsafe { libc::getitimer(libc::ITIMER_PROF, value.as_mut_ptr()) }))
}

// modes = 0 only reads the kernel clock state
fn adjtimex(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let mut buf: libc::timex = unsafe { std::mem::zeroed() };
    check(inv.timed(|| unsafe { libc::adjtimex(&mut buf) }))
}

fn timerfd_create(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let fd = inv.timed(|| unsafe {
        libc::timerfd_create(libc::CLOCK_MONOTONIC, libc::TFD_CLOEXEC | libc::TFD_NONBLOCK)
    });
    owned_fd(fd).map(drop)
}

fn timerfd_settime(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let fd = owned_fd(unsafe {
        libc::timerfd_create(libc::CLOCK_MONOTONIC, libc::TFD_CLOEXEC | libc::TFD_NONBLOCK)
    })?;
    let raw = fd.as_raw_fd();

    // Far enough out that it never fires before the fd is closed
    let spec = libc::itimerspec {
        it_interval: libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        },
        it_value: libc::timespec {
            tv_sec: 60,
            tv_nsec: 0,
        },
    };
    check(inv.timed(|| unsafe { libc::timerfd_settime(raw, 0, &spec, std::ptr::null_mut()) }))
}

fn timer_create(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let mut sev: libc::sigevent = unsafe { std::mem::zeroed() };
    sev.sigev_notify = libc::SIGEV_NONE;
    let mut timer: libc::timer_t = std::ptr::null_mut();
    check(inv.timed(|| unsafe { libc::timer_create(libc::CLOCK_MONOTONIC, &mut sev, &mut timer) }))?;
    unsafe { libc::timer_delete(timer) };
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::testing::{exercise, exercise_all};

    #[test]
    fn test_time_probes() {
        exercise_all(PROBES);
    }

    #[test]
    fn test_sleep_measures_nonzero_span() {
        let fx = Fixtures::new().unwrap();
        let mut inv = Invocation::new();
        nanosleep(&fx, &mut inv).unwrap();
        assert!(inv.duration().is_some());
        assert!(exercise(&PROBES[0], &fx).is_ok());
    }
}
