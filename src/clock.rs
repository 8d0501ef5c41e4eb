//! Monotonic nanosecond clock
//!
//! `now_ns()` returns nanoseconds elapsed since the first call in this
//! process. Storing deltas from a process-local baseline instead of absolute
//! clock readings keeps a `u64` good for roughly 584 years of runtime.
//!
//! The monotonic clock is preferred. If it cannot be read the realtime clock
//! is used instead, and if that fails too the reading is 0. Callers treat a
//! zero-length span as "unmeasured".

use nix::time::{clock_gettime, ClockId};
use std::sync::OnceLock;

/// Which clock the baseline was taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSource {
    Monotonic,
    Realtime,
    Unavailable,
}

#[derive(Debug, Clone, Copy)]
struct Baseline {
    source: ClockSource,
    origin_ns: u64,
}

static BASELINE: OnceLock<Baseline> = OnceLock::new();

fn read_clock(id: ClockId) -> Option<u64> {
    let ts = clock_gettime(id).ok()?;
    let secs = u64::try_from(ts.tv_sec()).ok()?;
    let nsecs = u64::try_from(ts.tv_nsec()).ok()?;
    secs.checked_mul(1_000_000_000)?.checked_add(nsecs)
}

fn read_source(source: ClockSource) -> Option<u64> {
    match source {
        ClockSource::Monotonic => read_clock(ClockId::CLOCK_MONOTONIC),
        ClockSource::Realtime => read_clock(ClockId::CLOCK_REALTIME),
        ClockSource::Unavailable => None,
    }
}

fn baseline() -> &'static Baseline {
    BASELINE.get_or_init(|| {
        for source in [ClockSource::Monotonic, ClockSource::Realtime] {
            if let Some(origin_ns) = read_source(source) {
                return Baseline { source, origin_ns };
            }
        }
        Baseline {
            source: ClockSource::Unavailable,
            origin_ns: 0,
        }
    })
}

/// Nanoseconds since the first call to `now_ns()` in this process
#[inline]
pub fn now_ns() -> u64 {
    let base = baseline();
    read_source(base.source)
        .map(|now| now.saturating_sub(base.origin_ns))
        .unwrap_or(0)
}

/// The clock backing `now_ns()`
pub fn source() -> ClockSource {
    baseline().source
}

/// One day in nanoseconds
pub const ONE_DAY_NS: u64 = 24 * 60 * 60 * 1_000_000_000;
