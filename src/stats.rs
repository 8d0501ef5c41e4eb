//! Per-probe statistics accumulated across rounds

use nix::errno::Errno;

/// Statistics for a single probe
///
/// Two different durations are tracked. `min/max/total_duration` come from
/// the span the probe recorded around the system call itself and are what
/// the report shows. `max_test_duration` is the wall-clock time of the whole
/// probe invocation (setup, fork, teardown) and is what ranking uses.
#[derive(Debug, Clone, PartialEq)]
pub struct SyscallStat {
    /// Number of successful timed invocations
    pub count: u64,
    /// Sum of per-call durations (nanoseconds)
    pub total_duration: f64,
    /// Fastest per-call duration (nanoseconds), `u64::MAX` until measured
    pub min_duration: u64,
    /// Slowest per-call duration (nanoseconds)
    pub max_duration: u64,
    /// Slowest whole-invocation time seen since the last ranking pass
    pub max_test_duration: u64,
    /// Errno of the most recent failed invocation
    pub syscall_errno: Option<Errno>,
    /// Set once the probe has completed without an unexpected error
    pub succeed: bool,
    /// Excluded from subsequent rounds
    pub ignore: bool,
}

impl Default for SyscallStat {
    fn default() -> Self {
        Self::new()
    }
}

impl SyscallStat {
    /// Fresh "never run" state
    pub fn new() -> Self {
        Self {
            count: 0,
            total_duration: 0.0,
            min_duration: u64::MAX,
            max_duration: 0,
            max_test_duration: 0,
            syscall_errno: None,
            succeed: false,
            ignore: false,
        }
    }

    /// Record the wall-clock time of one whole probe invocation
    pub fn record_test_duration(&mut self, duration: u64) {
        if duration > self.max_test_duration {
            self.max_test_duration = duration;
        }
    }

    /// Record one valid per-call duration
    pub fn record_sample(&mut self, duration: u64) {
        if duration < self.min_duration {
            self.min_duration = duration;
        }
        if duration > self.max_duration {
            self.max_duration = duration;
        }
        self.total_duration += duration as f64;
        self.count += 1;
        self.succeed = true;
    }

    /// An interrupted call counts as having worked but carries no sample
    pub fn record_interrupted(&mut self) {
        self.succeed = true;
    }

    pub fn record_failure(&mut self, errno: Errno) {
        self.syscall_errno = Some(errno);
    }

    /// Mean per-call duration, `None` if never measured
    pub fn average_duration(&self) -> Option<f64> {
        if self.succeed && self.count > 0 {
            Some(self.total_duration / self.count as f64)
        } else {
            None
        }
    }

    pub fn min(&self) -> Option<u64> {
        (self.count > 0).then_some(self.min_duration)
    }

    pub fn max(&self) -> Option<u64> {
        (self.count > 0).then_some(self.max_duration)
    }
}

/// Number of probes that have succeeded at least once
pub fn exercised(stats: &[SyscallStat]) -> usize {
    stats.iter().filter(|s| s.succeed).count()
}

/// Number of probes still taking part in rounds
pub fn active(stats: &[SyscallStat]) -> usize {
    stats.iter().filter(|s| !s.ignore).count()
}
