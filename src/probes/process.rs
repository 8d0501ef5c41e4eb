//! Process lifecycle and scheduler probes
//!
//! `fork`, `exit`, `wait4` and `waitid` need a child. The child only reads
//! the clock and reports through the handoff channel; every child is
//! reaped (or killed and reaped) before the probe returns.

use crate::clock::now_ns;
use crate::fixtures::Fixtures;
use crate::handoff::{self, Span, REAP_TIMEOUT};
use crate::probe::{check, Invocation, Probe, ProbeClass, ProbeResult};
use nix::errno::Errno;
use nix::sys::wait::{self, Id, WaitPidFlag};
use std::time::Duration;

pub const PROBES: &[Probe] = &[
    Probe::new("fork", ProbeClass::Process, fork),
    Probe::new("exit", ProbeClass::Process, exit),
    Probe::new("wait4", ProbeClass::Process, wait4),
    Probe::new("waitid", ProbeClass::Process, waitid),
    Probe::new("sched_yield", ProbeClass::Process, sched_yield),
    Probe::new("getpriority", ProbeClass::Process, getpriority),
    Probe::new("setpriority", ProbeClass::Process, setpriority),
    Probe::new("sched_getscheduler", ProbeClass::Process, sched_getscheduler),
    Probe::new("sched_getparam", ProbeClass::Process, sched_getparam),
    Probe::new("sched_get_priority_max", ProbeClass::Process, sched_get_priority_max),
    Probe::new("sched_getaffinity", ProbeClass::Process, sched_getaffinity),
    Probe::new("prctl", ProbeClass::Process, prctl),
];

/// From just before the fork to the child's first instruction
fn fork(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let start = now_ns();
    let child = handoff::spawn(move || Some(Span::new(start, now_ns())))?;
    if let Some(span) = child.reap(REAP_TIMEOUT)? {
        inv.set_span(span.start, span.end);
    }
    Ok(())
}

/// From the child's last instruction to the parent seeing it exit
fn exit(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let child = handoff::spawn(|| {
        let t = now_ns();
        Some(Span::new(t, t))
    })?;
    if !child.wait_exited(REAP_TIMEOUT)? {
        return child.reap(Duration::ZERO).map(drop);
    }
    let end = now_ns();
    if let Some(span) = child.reap(REAP_TIMEOUT)? {
        inv.set_span(span.start, end);
    }
    Ok(())
}

fn wait4(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let mut child = handoff::spawn(|| None)?;
    if !child.wait_exited(REAP_TIMEOUT)? {
        return child.reap(Duration::ZERO).map(drop);
    }
    let pid = child.pid();
    let status = inv.timed(|| wait::waitpid(pid, None));
    child.mark_reaped();
    status?;
    child.reap(REAP_TIMEOUT).map(drop)
}

fn waitid(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let mut child = handoff::spawn(|| None)?;
    if !child.wait_exited(REAP_TIMEOUT)? {
        return child.reap(Duration::ZERO).map(drop);
    }
    let pid = child.pid();
    let status = inv.timed(|| wait::waitid(Id::Pid(pid), WaitPidFlag::WEXITED));
    child.mark_reaped();
    status?;
    child.reap(REAP_TIMEOUT).map(drop)
}

fn sched_yield(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    check(inv.timed(|| unsafe { libc::sched_yield() }))
}

/// -1 is a valid nice value, so errno has to be cleared and re-checked
fn nice_value(ret: libc::c_int) -> Result<libc::c_int, Errno> {
    if ret == -1 && Errno::last_raw() != 0 {
        Err(Errno::last())
    } else {
        Ok(ret)
    }
}

fn getpriority(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    Errno::clear();
    let ret = inv.timed(|| unsafe { libc::getpriority(libc::PRIO_PROCESS, 0) });
    nice_value(ret).map(drop)
}

// Re-applying the current value needs no privilege
fn setpriority(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    Errno::clear();
    let nice = nice_value(unsafe { libc::getpriority(libc::PRIO_PROCESS, 0) })?;
    check(inv.timed(|| unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, nice) }))
}

fn sched_getscheduler(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    check(inv.timed(|| unsafe { libc::sched_getscheduler(0) }))
}

fn sched_getparam(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let mut param = libc::sched_param { sched_priority: 0 };
    check(inv.timed(|| unsafe { libc::sched_getparam(0, &mut param) }))
}

fn sched_get_priority_max(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    check(inv.timed(|| unsafe { libc::sched_get_priority_max(libc::SCHED_OTHER) }))
}

fn sched_getaffinity(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let mut set: libc::cpu_set_t = unsafe { std::mem::zeroed() };
    check(inv.timed(|| unsafe {
        libc::sched_getaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &mut set)
    }))
}

fn prctl(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let mut name = [0 as libc::c_char; 16];
    check(inv.timed(|| unsafe { libc::prctl(libc::PR_GET_NAME, name.as_mut_ptr()) }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::testing::exercise_all;

    #[test]
    fn test_process_probes() {
        exercise_all(PROBES);
    }

    #[test]
    fn test_fork_probes_measure_a_span() {
        let fx = Fixtures::new().unwrap();
        for probe in &PROBES[..4] {
            let mut inv = Invocation::new();
            (probe.invoke)(&fx, &mut inv).unwrap();
            assert!(inv.start().is_some(), "{}", probe.name);
            assert!(inv.end() >= inv.start(), "{}", probe.name);
        }
    }
}
