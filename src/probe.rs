//! Probe calling contract
//!
//! A probe performs exactly one exercise of a system call. It brackets the
//! call itself with `Invocation::timed` (or hands in a span recorded by a
//! child process) and returns `Err(errno)` when the call failed. Any setup
//! and teardown happens outside the timed span and is cleaned up before the
//! probe returns.

use crate::clock::now_ns;
use crate::fixtures::Fixtures;
use nix::errno::Errno;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of one probe invocation
pub type ProbeResult = Result<(), Errno>;

/// Probe entry point
pub type ProbeFn = fn(&Fixtures, &mut Invocation) -> ProbeResult;

/// Broad grouping of probes, used by the filter expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeClass {
    File,
    Process,
    Memory,
    Ipc,
    Signal,
    Time,
    Info,
}

impl ProbeClass {
    pub const ALL: [ProbeClass; 7] = [
        ProbeClass::File,
        ProbeClass::Process,
        ProbeClass::Memory,
        ProbeClass::Ipc,
        ProbeClass::Signal,
        ProbeClass::Time,
        ProbeClass::Info,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ProbeClass::File => "file",
            ProbeClass::Process => "process",
            ProbeClass::Memory => "memory",
            ProbeClass::Ipc => "ipc",
            ProbeClass::Signal => "signal",
            ProbeClass::Time => "time",
            ProbeClass::Info => "info",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

impl fmt::Display for ProbeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A registered system call probe
#[derive(Clone, Copy)]
pub struct Probe {
    pub name: &'static str,
    pub class: ProbeClass,
    pub invoke: ProbeFn,
}

impl Probe {
    pub const fn new(name: &'static str, class: ProbeClass, invoke: ProbeFn) -> Self {
        Self {
            name,
            class,
            invoke,
        }
    }
}

impl fmt::Debug for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Probe")
            .field("name", &self.name)
            .field("class", &self.class)
            .finish()
    }
}

/// Per-invocation scratch record
///
/// Replaces process-global `t1`/`t2` variables: the driver clears it, the
/// probe fills in the timed span, and the driver reads it back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Invocation {
    start: Option<u64>,
    end: Option<u64>,
}

impl Invocation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget any span recorded by a previous probe
    pub fn reset(&mut self) {
        self.start = None;
        self.end = None;
    }

    /// Run `f` between two clock readings and record them as the span
    #[inline]
    pub fn timed<T, F>(&mut self, f: F) -> T
    where
        F: FnOnce() -> T,
    {
        self.start = Some(now_ns());
        let result = f();
        self.end = Some(now_ns());
        result
    }

    /// Record a span measured elsewhere (e.g. by a forked child)
    pub fn set_span(&mut self, start: u64, end: u64) {
        self.start = Some(start);
        self.end = Some(end);
    }

    pub fn start(&self) -> Option<u64> {
        self.start
    }

    pub fn end(&self) -> Option<u64> {
        self.end
    }

    /// Length of the recorded span, if both ends were set and it is non-zero
    pub fn duration(&self) -> Option<u64> {
        match (self.start, self.end) {
            (Some(start), Some(end)) if end > start => Some(end - start),
            _ => None,
        }
    }
}

/// Map a libc return value (-1 on failure) to a probe result
#[inline]
pub fn check<S: nix::errno::ErrnoSentinel + PartialEq<S>>(ret: S) -> ProbeResult {
    Errno::result(ret).map(drop)
}
