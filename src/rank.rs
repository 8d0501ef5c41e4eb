//! Ranking pass: decide which probes stay active for the timed rounds
//!
//! Ranking looks at `max_test_duration`, the whole-invocation wall time, so
//! the kept set is the one that gets the most iterations through in the
//! time budget. A probe whose syscall is quick but whose wrapper forks a
//! child would otherwise eat a disproportionate share of the run.
//!
//! Every strategy ends by zeroing `max_test_duration` so calibration noise
//! does not leak into the next ranking.

use crate::clock::ONE_DAY_NS;
use crate::error::BenchError;
use crate::stats::SyscallStat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Probe selection strategy, fixed for the whole run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RankingMethod {
    /// Keep everything
    All,
    /// Keep the fastest n% by wrapper time
    Fast10,
    Fast25,
    Fast50,
    #[default]
    Fast75,
    Fast90,
    /// Keep probes no slower than k times the geometric mean wrapper time
    Geomean1,
    Geomean2,
    Geomean3,
}

/// What a ranking method boils down to
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Strategy {
    All,
    Fastest { percent: u32 },
    Geomean { scale: f64 },
}

impl RankingMethod {
    pub const ALL_METHODS: [RankingMethod; 9] = [
        RankingMethod::All,
        RankingMethod::Fast10,
        RankingMethod::Fast25,
        RankingMethod::Fast50,
        RankingMethod::Fast75,
        RankingMethod::Fast90,
        RankingMethod::Geomean1,
        RankingMethod::Geomean2,
        RankingMethod::Geomean3,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RankingMethod::All => "all",
            RankingMethod::Fast10 => "fast10",
            RankingMethod::Fast25 => "fast25",
            RankingMethod::Fast50 => "fast50",
            RankingMethod::Fast75 => "fast75",
            RankingMethod::Fast90 => "fast90",
            RankingMethod::Geomean1 => "geomean1",
            RankingMethod::Geomean2 => "geomean2",
            RankingMethod::Geomean3 => "geomean3",
        }
    }

    pub fn strategy(self) -> Strategy {
        match self {
            RankingMethod::All => Strategy::All,
            RankingMethod::Fast10 => Strategy::Fastest { percent: 10 },
            RankingMethod::Fast25 => Strategy::Fastest { percent: 25 },
            RankingMethod::Fast50 => Strategy::Fastest { percent: 50 },
            RankingMethod::Fast75 => Strategy::Fastest { percent: 75 },
            RankingMethod::Fast90 => Strategy::Fastest { percent: 90 },
            RankingMethod::Geomean1 => Strategy::Geomean { scale: 1.0 },
            RankingMethod::Geomean2 => Strategy::Geomean { scale: 2.0 },
            RankingMethod::Geomean3 => Strategy::Geomean { scale: 3.0 },
        }
    }
}

impl fmt::Display for RankingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RankingMethod {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL_METHODS
            .into_iter()
            .find(|m| m.name() == lower)
            .ok_or_else(|| BenchError::InvalidMethod(s.to_string()))
    }
}

impl TryFrom<String> for RankingMethod {
    type Error = BenchError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RankingMethod> for String {
    fn from(method: RankingMethod) -> Self {
        method.name().to_string()
    }
}

/// Outcome of a ranking pass
#[derive(Debug, Clone, PartialEq)]
pub struct RankSummary {
    pub method: RankingMethod,
    pub kept: usize,
    pub total: usize,
    /// Wrapper-time cutoff in nanoseconds (geomean strategies only)
    pub threshold: Option<f64>,
}

/// Run one ranking pass over `stats`, setting each probe's `ignore` flag
pub fn rank(method: RankingMethod, stats: &mut [SyscallStat]) -> RankSummary {
    let threshold = match method.strategy() {
        Strategy::All => {
            for stat in stats.iter_mut() {
                stat.ignore = false;
            }
            None
        }
        Strategy::Fastest { percent } => {
            rank_fastest(stats, percent);
            None
        }
        Strategy::Geomean { scale } => Some(rank_geomean(stats, scale)),
    };

    for stat in stats.iter_mut() {
        stat.max_test_duration = 0;
    }

    let kept = crate::stats::active(stats);
    debug!(
        "ranking {}: kept {} of {} probes (threshold {:?})",
        method,
        kept,
        stats.len(),
        threshold
    );

    RankSummary {
        method,
        kept,
        total: stats.len(),
        threshold,
    }
}

/// Number of probes a `Fastest { percent }` pass may keep
pub fn fastest_budget(total: usize, percent: u32) -> usize {
    (total as f64 * f64::from(percent) / 100.0).round() as usize
}

/// Keep the fastest `percent`% of probes by wrapper time
fn rank_fastest(stats: &mut [SyscallStat], percent: u32) {
    let max_keep = fastest_budget(stats.len(), percent);

    // An unmeasured (zero) wrapper time sorts after every measured one
    let mut order: Vec<usize> = (0..stats.len()).collect();
    order.sort_by_key(|&i| {
        let d = stats[i].max_test_duration;
        (d == 0, d)
    });

    let mut kept = 0;
    for i in order {
        let stat = &mut stats[i];
        if stat.succeed && kept < max_keep {
            stat.ignore = false;
            kept += 1;
        } else {
            stat.ignore = true;
        }
    }
}

/// Keep probes whose wrapper time is at most `scale` times the geometric
/// mean; returns the threshold used
fn rank_geomean(stats: &mut [SyscallStat], scale: f64) -> f64 {
    let mean = geomean(stats).unwrap_or(ONE_DAY_NS as f64);
    let threshold = mean * scale;

    for stat in stats.iter_mut() {
        stat.ignore = !stat.succeed || stat.max_test_duration as f64 > threshold;
    }
    threshold
}

/// Geometric mean of `max_test_duration` over successful, measured probes
///
/// Accumulates mantissas and binary exponents separately so hundreds of
/// nanosecond-scale values can be multiplied without overflow.
pub fn geomean(stats: &[SyscallStat]) -> Option<f64> {
    let mut mantissa = 1.0f64;
    let mut exponent: i64 = 0;
    let mut n: i64 = 0;

    for stat in stats {
        if !stat.succeed || stat.max_test_duration == 0 {
            continue;
        }
        let (m, e) = frexp(stat.max_test_duration as f64);
        let (m, carry) = frexp(mantissa * m);
        mantissa = m;
        exponent += i64::from(e) + i64::from(carry);
        n += 1;
    }

    if n == 0 {
        return None;
    }

    // 2^(exponent/n) = 2^q * 2^(r/n); fold 2^r into the mantissa root so
    // exact powers come out exact
    let inv_n = 1.0 / n as f64;
    let q = exponent.div_euclid(n);
    let r = exponent.rem_euclid(n);
    let root = if r < 1000 {
        (mantissa * 2f64.powi(r as i32)).powf(inv_n)
    } else {
        mantissa.powf(inv_n) * (r as f64 * inv_n).exp2()
    };
    Some(root * 2f64.powi(q as i32))
}

/// Split `x` into a mantissa in [0.5, 1) and a power of two
pub fn frexp(x: f64) -> (f64, i32) {
    if x == 0.0 || !x.is_finite() {
        return (x, 0);
    }
    let bits = x.to_bits();
    let biased = ((bits >> 52) & 0x7ff) as i32;
    if biased == 0 {
        let (m, e) = frexp(x * 2f64.powi(64));
        return (m, e - 64);
    }
    let mantissa = f64::from_bits((bits & !(0x7ffu64 << 52)) | (1022u64 << 52));
    (mantissa, biased - 1022)
}
