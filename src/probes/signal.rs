//! Signal masks, dispositions and delivery
//!
//! Delivery probes use SIGWINCH: its default action is to ignore, so a
//! stray pending instance left behind by a failed probe is harmless once
//! the saved mask and disposition are back in place.

use crate::fixtures::Fixtures;
use crate::probe::{check, Invocation, Probe, ProbeClass, ProbeResult};
use crate::probes::owned_fd;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal};
use nix::unistd::Pid;
use std::mem::MaybeUninit;

pub const PROBES: &[Probe] = &[
    Probe::new("kill", ProbeClass::Signal, kill),
    Probe::new("tgkill", ProbeClass::Signal, tgkill),
    Probe::new("rt_sigprocmask", ProbeClass::Signal, rt_sigprocmask),
    Probe::new("rt_sigaction", ProbeClass::Signal, rt_sigaction),
    Probe::new("rt_sigpending", ProbeClass::Signal, rt_sigpending),
    Probe::new("sigaltstack", ProbeClass::Signal, sigaltstack),
    Probe::new("rt_sigtimedwait", ProbeClass::Signal, rt_sigtimedwait),
    Probe::new("signalfd4", ProbeClass::Signal, signalfd4),
    Probe::new("raise", ProbeClass::Signal, raise),
];

const PROBE_SIGNAL: Signal = Signal::SIGWINCH;

const NO_WAIT: libc::timespec = libc::timespec {
    tv_sec: 0,
    tv_nsec: 0,
};

extern "C" fn on_probe_signal(_: libc::c_int) {}

fn probe_set() -> SigSet {
    let mut set = SigSet::empty();
    set.add(PROBE_SIGNAL);
    set
}

// Signal 0: permission and existence check only
fn kill(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let pid = Pid::from_raw(fx.pid);
    inv.timed(|| signal::kill(pid, None))
}

fn tgkill(fx: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let tid = unsafe { libc::syscall(libc::SYS_gettid) };
    check(inv.timed(|| unsafe {
        libc::syscall(libc::SYS_tgkill, fx.pid as libc::c_long, tid, 0 as libc::c_long)
    }))
}

fn rt_sigprocmask(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let mut old = MaybeUninit::<libc::sigset_t>::uninit();
    check(inv.timed(|| unsafe {
        libc::sigprocmask(libc::SIG_BLOCK, std::ptr::null(), old.as_mut_ptr())
    }))
}

fn rt_sigaction(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let mut old = MaybeUninit::<libc::sigaction>::uninit();
    check(inv.timed(|| unsafe {
        libc::sigaction(PROBE_SIGNAL as libc::c_int, std::ptr::null(), old.as_mut_ptr())
    }))
}

fn rt_sigpending(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let mut set = MaybeUninit::<libc::sigset_t>::uninit();
    check(inv.timed(|| unsafe { libc::sigpending(set.as_mut_ptr()) }))
}

fn sigaltstack(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let mut old = MaybeUninit::<libc::stack_t>::uninit();
    check(inv.timed(|| unsafe { libc::sigaltstack(std::ptr::null(), old.as_mut_ptr()) }))
}

/// Collect a signal that is already pending, so the wait returns at once
fn rt_sigtimedwait(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let set = probe_set();
    let old = set.thread_swap_mask(SigmaskHow::SIG_BLOCK)?;
    let result = signal::raise(PROBE_SIGNAL).and_then(|()| {
        check(inv.timed(|| unsafe {
            libc::sigtimedwait(set.as_ref(), std::ptr::null_mut(), &NO_WAIT)
        }))
    });
    old.thread_set_mask()?;
    result
}

fn signalfd4(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let set = probe_set();
    let fd = inv.timed(|| unsafe {
        libc::signalfd(-1, set.as_ref(), libc::SFD_CLOEXEC | libc::SFD_NONBLOCK)
    });
    owned_fd(fd).map(drop)
}

/// Send a signal to the calling thread and run its handler
fn raise(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let action = SigAction::new(
        SigHandler::Handler(on_probe_signal),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    let old = unsafe { signal::sigaction(PROBE_SIGNAL, &action) }?;
    let result = inv.timed(|| signal::raise(PROBE_SIGNAL));
    unsafe { signal::sigaction(PROBE_SIGNAL, &old) }?;
    result
}
