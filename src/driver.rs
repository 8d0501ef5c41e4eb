//! Benchmark driver
//!
//! A run is: `calibration_rounds` rounds over every probe in registry order,
//! one ranking pass, then shuffled rounds over the kept probes until the
//! deadline, the op budget or a stop request ends it. Everything happens on
//! the calling thread, one probe at a time.

use crate::clock::now_ns;
use crate::config::BenchConfig;
use crate::fixtures::Fixtures;
use crate::probe::{Invocation, Probe, ProbeResult};
use crate::rank::{rank, RankSummary, RankingMethod};
use crate::shuffle::ShuffleIndex;
use crate::stats::{self, SyscallStat};
use nix::errno::Errno;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, trace, warn};

/// Stop conditions and the bogo-op counter for one run
#[derive(Debug)]
pub struct RunControl {
    /// Absolute deadline on the `now_ns()` clock
    deadline: Option<u64>,
    /// 0 = unlimited
    max_ops: u64,
    ops: u64,
    running: Arc<AtomicBool>,
}

impl RunControl {
    /// `duration` of zero means no deadline; `max_ops` of zero means no
    /// op limit
    pub fn new(duration: Duration, max_ops: u64) -> Self {
        let deadline = if duration.is_zero() {
            None
        } else {
            let budget = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
            Some(now_ns().saturating_add(budget))
        };
        Self {
            deadline,
            max_ops,
            ops: 0,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Share an externally owned "continue" flag (e.g. cleared by SIGINT)
    pub fn with_running_flag(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = running;
        self
    }

    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn keep_going(&self) -> bool {
        if !self.running.load(Ordering::SeqCst) {
            return false;
        }
        if self.max_ops > 0 && self.ops >= self.max_ops {
            return false;
        }
        match self.deadline {
            Some(deadline) => now_ns() < deadline,
            None => true,
        }
    }

    /// Count one attempted probe
    pub fn bump(&mut self) {
        self.ops += 1;
    }

    pub fn ops(&self) -> u64 {
        self.ops
    }
}

/// Invoke one probe and fold the outcome into its statistics
///
/// The wrapper time (whole call, including setup and any child process) is
/// always recorded. The per-call span only counts when the probe succeeded
/// and reported a non-empty span. `EINTR` is treated as a success without a
/// sample.
pub fn measure(
    probe: &Probe,
    fixtures: &Fixtures,
    stat: &mut SyscallStat,
    inv: &mut Invocation,
) -> ProbeResult {
    inv.reset();

    let test_t1 = now_ns();
    let outcome = (probe.invoke)(fixtures, inv);
    let test_t2 = now_ns();
    stat.record_test_duration(test_t2.saturating_sub(test_t1));

    match outcome {
        Err(Errno::EINTR) => {
            stat.record_interrupted();
            Ok(())
        }
        Err(errno) => {
            trace!("{} failed: {}", probe.name, errno);
            stat.record_failure(errno);
            Err(errno)
        }
        Ok(()) => {
            if let Some(duration) = inv.duration() {
                stat.record_sample(duration);
            }
            Ok(())
        }
    }
}

/// Summary of a finished run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub calibration_rounds: u64,
    /// Fully completed rounds after the ranking pass
    pub rounds: u64,
    pub ops: u64,
    pub elapsed_ns: u64,
    pub ranking: RankSummary,
}

/// Probes, their statistics and the execution order
pub struct Benchmark<'a> {
    probes: Vec<Probe>,
    stats: Vec<SyscallStat>,
    order: ShuffleIndex,
    fixtures: &'a Fixtures,
    method: RankingMethod,
    calibration_rounds: u32,
    inv: Invocation,
}

impl<'a> Benchmark<'a> {
    pub fn new(probes: Vec<Probe>, fixtures: &'a Fixtures, config: &BenchConfig) -> Self {
        let stats = vec![SyscallStat::new(); probes.len()];
        let order = ShuffleIndex::new(probes.len(), config.shuffle, config.seed);
        Self {
            probes,
            stats,
            order,
            fixtures,
            method: config.method,
            calibration_rounds: config.calibration_rounds.max(1),
            inv: Invocation::new(),
        }
    }

    pub fn probes(&self) -> &[Probe] {
        &self.probes
    }

    pub fn stats(&self) -> &[SyscallStat] {
        &self.stats
    }

    pub fn order(&self) -> &[usize] {
        self.order.as_slice()
    }

    /// One pass over the non-ignored probes in current order
    ///
    /// Returns `false` if the run was stopped part way through.
    pub fn run_round(&mut self, ctl: &mut RunControl) -> bool {
        for slot in 0..self.order.len() {
            let index = self.order.as_slice()[slot];
            if self.stats[index].ignore {
                continue;
            }
            if !ctl.keep_going() {
                return false;
            }
            let _ = measure(
                &self.probes[index],
                self.fixtures,
                &mut self.stats[index],
                &mut self.inv,
            );
            ctl.bump();
        }
        true
    }

    /// Calibrate, rank, then measure until `ctl` says stop
    pub fn run(&mut self, ctl: &mut RunControl) -> RunOutcome {
        let started = now_ns();
        let mut calibration_rounds = 0;

        info!(
            "calibrating {} probes over {} round(s)",
            self.probes.len(),
            self.calibration_rounds
        );
        for _ in 0..self.calibration_rounds {
            let completed = self.run_round(ctl);
            if !completed {
                break;
            }
            calibration_rounds += 1;
        }

        let ranking = rank(self.method, &mut self.stats);
        info!(
            "ranking {}: {} of {} probes kept",
            ranking.method, ranking.kept, ranking.total
        );
        self.order.rebuild();

        let mut rounds = 0;
        if ranking.kept == 0 {
            warn!("no probes left after ranking, skipping timed rounds");
        } else {
            while ctl.keep_going() {
                if !self.run_round(ctl) {
                    break;
                }
                rounds += 1;
                self.order.shuffle();
            }
        }

        let exercised = stats::exercised(&self.stats);
        info!(
            "finished: {} rounds, {} bogo-ops, {} of {} probes exercised",
            rounds,
            ctl.ops(),
            exercised,
            self.probes.len()
        );

        RunOutcome {
            calibration_rounds,
            rounds,
            ops: ctl.ops(),
            elapsed_ns: now_ns().saturating_sub(started),
            ranking,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeClass;

    fn ok_probe(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
        inv.set_span(1_000, 1_250);
        Ok(())
    }

    fn eintr_probe(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
        inv.set_span(1_000, 9_000);
        Err(Errno::EINTR)
    }

    fn enosys_probe(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
        inv.set_span(1_000, 2_000);
        Err(Errno::ENOSYS)
    }

    fn untimed_probe(_: &Fixtures, _: &mut Invocation) -> ProbeResult {
        Ok(())
    }

    fn slow_probe(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
        std::thread::sleep(Duration::from_millis(2));
        inv.set_span(10, 20);
        Ok(())
    }

    fn probe(name: &'static str, f: crate::probe::ProbeFn) -> Probe {
        Probe::new(name, ProbeClass::Info, f)
    }

    #[test]
    fn test_measure_success_records_sample() {
        let fx = Fixtures::new().unwrap();
        let mut stat = SyscallStat::new();
        let mut inv = Invocation::new();
        measure(&probe("ok", ok_probe), &fx, &mut stat, &mut inv).unwrap();
        assert_eq!(stat.count, 1);
        assert_eq!(stat.min(), Some(250));
        assert!(stat.succeed);
    }

    #[test]
    fn test_measure_failure_leaves_timing_untouched() {
        let fx = Fixtures::new().unwrap();
        let mut stat = SyscallStat::new();
        let mut inv = Invocation::new();
        let r = measure(&probe("nosys", enosys_probe), &fx, &mut stat, &mut inv);
        assert_eq!(r, Err(Errno::ENOSYS));
        assert_eq!(stat.count, 0);
        assert!(!stat.succeed);
        assert_eq!(stat.syscall_errno, Some(Errno::ENOSYS));
    }

    #[test]
    fn test_measure_without_span_is_not_counted() {
        let fx = Fixtures::new().unwrap();
        let mut stat = SyscallStat::new();
        let mut inv = Invocation::new();
        inv.set_span(1, 1_000_000);
        measure(&probe("untimed", untimed_probe), &fx, &mut stat, &mut inv).unwrap();
        assert_eq!(stat.count, 0);
        assert!(!stat.succeed);
    }

    #[test]
    fn test_interrupted_after_successes_keeps_count() {
        let fx = Fixtures::new().unwrap();
        let mut stat = SyscallStat::new();
        let mut inv = Invocation::new();
        for _ in 0..4 {
            measure(&probe("p", ok_probe), &fx, &mut stat, &mut inv).unwrap();
        }
        let before = stat.clone();
        let r = measure(&probe("p", eintr_probe), &fx, &mut stat, &mut inv);
        assert_eq!(r, Ok(()));
        assert_eq!(stat.count, 4);
        assert_eq!(stat.total_duration, before.total_duration);
        assert_eq!(stat.min_duration, before.min_duration);
        assert_eq!(stat.max_duration, before.max_duration);
        assert!(stat.succeed);
    }

    #[test]
    fn test_wrapper_time_recorded_even_on_failure() {
        let fx = Fixtures::new().unwrap();
        let mut stat = SyscallStat::new();
        let mut inv = Invocation::new();
        let _ = measure(&probe("slow", slow_probe), &fx, &mut stat, &mut inv);
        assert!(stat.max_test_duration >= 2_000_000);
    }

    #[test]
    fn test_run_control_op_budget() {
        let mut ctl = RunControl::new(Duration::ZERO, 3);
        assert!(ctl.keep_going());
        ctl.bump();
        ctl.bump();
        ctl.bump();
        assert!(!ctl.keep_going());
        assert_eq!(ctl.ops(), 3);
    }

    #[test]
    fn test_run_control_deadline() {
        let ctl = RunControl::new(Duration::from_millis(5), 0);
        assert!(ctl.keep_going());
        std::thread::sleep(Duration::from_millis(10));
        assert!(!ctl.keep_going());
    }

    #[test]
    fn test_run_control_stop_flag() {
        let ctl = RunControl::new(Duration::ZERO, 0);
        let flag = ctl.running_flag();
        flag.store(false, Ordering::SeqCst);
        assert!(!ctl.keep_going());
    }

    #[test]
    fn test_round_skips_ignored_and_counts_ops() {
        let fx = Fixtures::new().unwrap();
        let config = BenchConfig::default();
        let probes = vec![probe("a", ok_probe), probe("b", ok_probe), probe("c", ok_probe)];
        let mut bench = Benchmark::new(probes, &fx, &config);
        bench.stats[1].ignore = true;
        let mut ctl = RunControl::new(Duration::ZERO, 0);
        assert!(bench.run_round(&mut ctl));
        assert_eq!(ctl.ops(), 2);
        assert_eq!(bench.stats()[1].count, 0);
        assert_eq!(bench.stats()[0].count, 1);
    }

    #[test]
    fn test_round_stops_mid_way() {
        let fx = Fixtures::new().unwrap();
        let config = BenchConfig::default();
        let probes = vec![probe("a", ok_probe), probe("b", ok_probe), probe("c", ok_probe)];
        let mut bench = Benchmark::new(probes, &fx, &config);
        let mut ctl = RunControl::new(Duration::ZERO, 2);
        assert!(!bench.run_round(&mut ctl));
        assert_eq!(ctl.ops(), 2);
    }

    #[test]
    fn test_full_run_ranks_and_measures() {
        let fx = Fixtures::new().unwrap();
        let config = BenchConfig {
            method: RankingMethod::Fast50,
            seed: Some(5),
            ..BenchConfig::default()
        };
        let probes = vec![
            probe("ok1", ok_probe),
            probe("nosys", enosys_probe),
            probe("ok2", ok_probe),
            probe("slow", slow_probe),
        ];
        let mut bench = Benchmark::new(probes, &fx, &config);
        let mut ctl = RunControl::new(Duration::ZERO, 40);
        let outcome = bench.run(&mut ctl);

        assert_eq!(outcome.calibration_rounds, 1);
        assert_eq!(outcome.ops, 40);
        assert!(outcome.rounds >= 1);
        let ranking = outcome.ranking;
        assert_eq!(ranking.kept, 2);
        assert!(bench.stats()[1].ignore);
        assert!(bench.stats()[3].ignore);
        assert!(!bench.stats()[0].ignore);
        assert!(!bench.stats()[2].ignore);
    }

    #[test]
    fn test_run_with_nothing_kept_returns() {
        let fx = Fixtures::new().unwrap();
        let config = BenchConfig::default();
        let probes = vec![probe("nosys", enosys_probe)];
        let mut bench = Benchmark::new(probes, &fx, &config);
        let mut ctl = RunControl::new(Duration::ZERO, 0);
        let outcome = bench.run(&mut ctl);
        assert_eq!(outcome.rounds, 0);
        assert_eq!(outcome.ops, 1);
        assert!(bench.stats()[0].ignore);
    }
}
