//! End-of-run report
//!
//! Succeeded probes are sorted by mean per-call duration and the fastest N
//! are reported, together with run totals. Probes that never succeeded are
//! left out of the ranking table; the JSON form lists them separately with
//! the last errno they hit.

use crate::driver::RunOutcome;
use crate::probe::{Probe, ProbeClass};
use crate::rank::RankingMethod;
use crate::stats::{self, SyscallStat};
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt::Write as _;
use tracing::{debug, warn};

/// One row of the fastest-probes table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    /// 1-based position in the table
    pub rank: usize,
    pub syscall: String,
    pub class: ProbeClass,
    /// Timed invocations
    pub calls: u64,
    /// Mean per-call duration in nanoseconds
    pub avg_ns: Option<f64>,
    pub min_ns: Option<u64>,
    pub max_ns: Option<u64>,
}

/// A probe that never completed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedProbe {
    pub syscall: String,
    pub class: ProbeClass,
    /// Last errno observed, e.g. "ENOSYS"
    pub errno: Option<String>,
}

/// Run totals
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub method: RankingMethod,
    pub calibration_rounds: u64,
    pub rounds: u64,
    pub bogo_ops: u64,
    pub elapsed_secs: f64,
    pub bogo_ops_per_sec: f64,
    pub probes_total: usize,
    pub probes_exercised: usize,
    pub exercised_pct: f64,
    /// Probes left active after the ranking pass
    pub probes_kept: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold_ns: Option<f64>,
}

/// Complete report, ready to render
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub summary: RunSummary,
    pub fastest: Vec<ReportRow>,
    pub failed: Vec<FailedProbe>,
}

/// Indices of succeeded probes, fastest mean first, at most `top_n` of
/// them (0 = all)
///
/// A probe that only ever succeeded through an interrupted call has no
/// mean and sorts after every measured one.
pub fn fastest(stats: &[SyscallStat], top_n: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..stats.len()).filter(|&i| stats[i].succeed).collect();
    order.sort_by(|&a, &b| {
        match (stats[a].average_duration(), stats[b].average_duration()) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    });
    if top_n > 0 && top_n < order.len() {
        order.truncate(top_n);
    }
    order
}

impl Report {
    pub fn build(probes: &[Probe], stats: &[SyscallStat], outcome: &RunOutcome, top_n: usize) -> Self {
        let fastest = fastest(stats, top_n)
            .into_iter()
            .enumerate()
            .map(|(pos, i)| ReportRow {
                rank: pos + 1,
                syscall: probes[i].name.to_string(),
                class: probes[i].class,
                calls: stats[i].count,
                avg_ns: stats[i].average_duration(),
                min_ns: stats[i].min(),
                max_ns: stats[i].max(),
            })
            .collect();

        let failed = probes
            .iter()
            .zip(stats)
            .filter(|(_, s)| !s.succeed)
            .map(|(p, s)| FailedProbe {
                syscall: p.name.to_string(),
                class: p.class,
                errno: s.syscall_errno.map(|e| format!("{:?}", e)),
            })
            .collect();

        let total = probes.len();
        let exercised = stats::exercised(stats);
        let elapsed_secs = outcome.elapsed_ns as f64 / 1e9;
        let summary = RunSummary {
            method: outcome.ranking.method,
            calibration_rounds: outcome.calibration_rounds,
            rounds: outcome.rounds,
            bogo_ops: outcome.ops,
            elapsed_secs,
            bogo_ops_per_sec: if elapsed_secs > 0.0 {
                outcome.ops as f64 / elapsed_secs
            } else {
                0.0
            },
            probes_total: total,
            probes_exercised: exercised,
            exercised_pct: if total > 0 {
                100.0 * exercised as f64 / total as f64
            } else {
                0.0
            },
            probes_kept: outcome.ranking.kept,
            threshold_ns: outcome.ranking.threshold,
        };

        Self {
            summary,
            fastest,
            failed,
        }
    }

    /// Warn about how much of the registry actually ran
    pub fn log_coverage(&self) {
        for probe in &self.failed {
            debug!(
                "{} never succeeded (last errno {})",
                probe.syscall,
                probe.errno.as_deref().unwrap_or("none")
            );
        }
        warn!(
            "{} of {} ({:.1}%) system calls exercised",
            self.summary.probes_exercised, self.summary.probes_total, self.summary.exercised_pct
        );
    }

    /// Human-readable table
    pub fn to_text(&self) -> String {
        let s = &self.summary;
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} rounds, {} bogo-ops in {:.2}s ({:.2} bogo-ops/sec), method {}",
            s.rounds, s.bogo_ops, s.elapsed_secs, s.bogo_ops_per_sec, s.method
        );
        let _ = writeln!(
            out,
            "{} of {} probes exercised ({:.1}%), {} kept after ranking",
            s.probes_exercised, s.probes_total, s.exercised_pct, s.probes_kept
        );

        if self.fastest.is_empty() {
            out.push_str("\nNo system calls measured.\n");
            return out;
        }

        out.push('\n');
        out.push_str("rank      avg(ns)    min(ns)    max(ns)      calls syscall\n");
        out.push_str("---- ------------ ---------- ---------- ---------- ----------------\n");
        for row in &self.fastest {
            let _ = writeln!(
                out,
                "{:>4} {:>12} {:>10} {:>10} {:>10} {}",
                row.rank,
                row.avg_ns.map_or_else(|| "-".to_string(), |v| format!("{:.2}", v)),
                opt_ns(row.min_ns),
                opt_ns(row.max_ns),
                row.calls,
                row.syscall
            );
        }
        out
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Header plus one row per reported probe
    pub fn to_csv(&self) -> String {
        let mut out = String::from("rank,syscall,class,calls,avg_ns,min_ns,max_ns\n");
        for row in &self.fastest {
            let fields = [
                row.rank.to_string(),
                escape_field(&row.syscall),
                row.class.to_string(),
                row.calls.to_string(),
                row.avg_ns.map(|v| format!("{:.2}", v)).unwrap_or_default(),
                row.min_ns.map(|v| v.to_string()).unwrap_or_default(),
                row.max_ns.map(|v| v.to_string()).unwrap_or_default(),
            ];
            out.push_str(&fields.join(","));
            out.push('\n');
        }
        out
    }
}

fn opt_ns(value: Option<u64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

/// Quote a CSV field containing a comma, quote or newline
fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Fixtures;
    use crate::probe::{Invocation, ProbeResult};
    use crate::rank::RankSummary;
    use nix::errno::Errno;

    fn noop(_: &Fixtures, _: &mut Invocation) -> ProbeResult {
        Ok(())
    }

    fn measured(samples: &[u64]) -> SyscallStat {
        let mut stat = SyscallStat::new();
        for &d in samples {
            stat.record_sample(d);
        }
        stat
    }

    fn failed(errno: Errno) -> SyscallStat {
        let mut stat = SyscallStat::new();
        stat.record_failure(errno);
        stat.ignore = true;
        stat
    }

    fn fixture() -> (Vec<Probe>, Vec<SyscallStat>, RunOutcome) {
        let probes = vec![
            Probe::new("slow", ProbeClass::File, noop),
            Probe::new("nosys", ProbeClass::Info, noop),
            Probe::new("fast", ProbeClass::Info, noop),
            Probe::new("mid", ProbeClass::Memory, noop),
        ];
        let stats = vec![
            measured(&[900, 1100]),
            failed(Errno::ENOSYS),
            measured(&[40, 60]),
            measured(&[300]),
        ];
        let outcome = RunOutcome {
            calibration_rounds: 1,
            rounds: 10,
            ops: 2_000,
            elapsed_ns: 2_000_000_000,
            ranking: RankSummary {
                method: RankingMethod::Fast75,
                kept: 3,
                total: 4,
                threshold: None,
            },
        };
        (probes, stats, outcome)
    }

    #[test]
    fn test_fastest_sorted_by_average() {
        let (_, stats, _) = fixture();
        assert_eq!(fastest(&stats, 0), vec![2, 3, 0]);
    }

    #[test]
    fn test_fastest_clamps_top_n() {
        let (_, stats, _) = fixture();
        assert_eq!(fastest(&stats, 2), vec![2, 3]);
        assert_eq!(fastest(&stats, 50).len(), 3);
    }

    #[test]
    fn test_interrupted_only_probe_sorts_last() {
        let mut interrupted = SyscallStat::new();
        interrupted.record_interrupted();
        let stats = vec![interrupted, measured(&[10])];
        assert_eq!(fastest(&stats, 0), vec![1, 0]);
    }

    #[test]
    fn test_build_rows_and_summary() {
        let (probes, stats, outcome) = fixture();
        let report = Report::build(&probes, &stats, &outcome, 10);

        let names: Vec<_> = report.fastest.iter().map(|r| r.syscall.as_str()).collect();
        assert_eq!(names, vec!["fast", "mid", "slow"]);
        assert_eq!(report.fastest[0].rank, 1);
        assert_eq!(report.fastest[0].avg_ns, Some(50.0));
        assert_eq!(report.fastest[0].min_ns, Some(40));
        assert_eq!(report.fastest[0].max_ns, Some(60));

        assert_eq!(report.summary.probes_exercised, 3);
        assert_eq!(report.summary.probes_total, 4);
        assert!((report.summary.exercised_pct - 75.0).abs() < 1e-9);
        assert!((report.summary.bogo_ops_per_sec - 1000.0).abs() < 1e-9);

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].syscall, "nosys");
        assert_eq!(report.failed[0].errno.as_deref(), Some("ENOSYS"));
    }

    #[test]
    fn test_text_output() {
        let (probes, stats, outcome) = fixture();
        let text = Report::build(&probes, &stats, &outcome, 2).to_text();
        assert!(text.contains("method fast75"));
        assert!(text.contains("3 of 4 probes exercised (75.0%)"));
        assert!(text.contains("fast"));
        assert!(text.contains("mid"));
        assert!(!text.contains("slow"));
        assert!(!text.contains("nosys"));
    }

    #[test]
    fn test_text_output_without_measurements() {
        let probes = vec![Probe::new("nosys", ProbeClass::Info, noop)];
        let stats = vec![failed(Errno::ENOSYS)];
        let (_, _, outcome) = fixture();
        let text = Report::build(&probes, &stats, &outcome, 10).to_text();
        assert!(text.contains("No system calls measured."));
    }

    #[test]
    fn test_json_output() {
        let (probes, stats, outcome) = fixture();
        let json = Report::build(&probes, &stats, &outcome, 10).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["summary"]["method"], "fast75");
        assert_eq!(value["summary"]["bogo_ops"], 2000);
        assert_eq!(value["fastest"][0]["syscall"], "fast");
        assert_eq!(value["fastest"][0]["class"], "info");
        assert_eq!(value["failed"][0]["errno"], "ENOSYS");
        assert!(value["summary"].get("threshold_ns").is_none());
    }

    #[test]
    fn test_csv_output() {
        let (probes, stats, outcome) = fixture();
        let csv = Report::build(&probes, &stats, &outcome, 10).to_csv();
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines[0], "rank,syscall,class,calls,avg_ns,min_ns,max_ns");
        assert_eq!(lines[1], "1,fast,info,2,50.00,40,60");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_csv_escape_field() {
        assert_eq!(escape_field("read"), "read");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
