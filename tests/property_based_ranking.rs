// Property-based tests for statistics, ranking, shuffling and reporting
//
// Uses proptest to check the invariants over random measurement data.

use proptest::prelude::*;
use sysrank::rank::{fastest_budget, geomean, rank, RankingMethod};
use sysrank::report::fastest;
use sysrank::shuffle::{ShuffleIndex, ShuffleMode};
use sysrank::stats::SyscallStat;

/// (samples, wrapper time, succeeded) for one probe
fn probe_data() -> impl Strategy<Value = (Vec<u64>, u64, bool)> {
    (
        prop::collection::vec(1u64..1_000_000, 0..8),
        0u64..10_000_000,
        any::<bool>(),
    )
}

fn build(data: &[(Vec<u64>, u64, bool)]) -> Vec<SyscallStat> {
    data.iter()
        .map(|(samples, wrapper, ok)| {
            let mut stat = SyscallStat::new();
            if *ok {
                for &d in samples {
                    stat.record_sample(d);
                }
                if samples.is_empty() {
                    stat.record_interrupted();
                }
            } else {
                stat.record_failure(nix::errno::Errno::ENOSYS);
            }
            stat.record_test_duration(*wrapper);
            stat
        })
        .collect()
}

fn kept(stats: &[SyscallStat]) -> Vec<usize> {
    (0..stats.len()).filter(|&i| !stats[i].ignore).collect()
}

fn fast_methods() -> impl Strategy<Value = (RankingMethod, u32)> {
    prop_oneof![
        Just((RankingMethod::Fast10, 10)),
        Just((RankingMethod::Fast25, 25)),
        Just((RankingMethod::Fast50, 50)),
        Just((RankingMethod::Fast75, 75)),
        Just((RankingMethod::Fast90, 90)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_average_between_min_and_max(
        samples in prop::collection::vec(0u64..u64::MAX / 1024, 1..64)
    ) {
        let mut stat = SyscallStat::new();
        for &d in &samples {
            stat.record_sample(d);
        }
        let avg = stat.average_duration().unwrap();
        let min = stat.min().unwrap() as f64;
        let max = stat.max().unwrap() as f64;
        // Summing in f64 can round the mean a hair past either bound
        let slack = max * 1e-12;
        prop_assert!(min <= avg + slack, "min {} avg {}", min, avg);
        prop_assert!(avg <= max + slack, "avg {} max {}", avg, max);
        prop_assert_eq!(stat.count, samples.len() as u64);
    }

    #[test]
    fn prop_fast_ranking_respects_budget(
        data in prop::collection::vec(probe_data(), 0..60),
        (method, percent) in fast_methods(),
    ) {
        let mut stats = build(&data);
        let summary = rank(method, &mut stats);
        let kept = kept(&stats);
        prop_assert!(kept.len() <= fastest_budget(stats.len(), percent));
        prop_assert_eq!(summary.kept, kept.len());
        for i in kept {
            prop_assert!(stats[i].succeed);
        }
    }

    #[test]
    fn prop_fast_ranking_keeps_the_fastest(
        data in prop::collection::vec(probe_data(), 1..40),
        (method, _) in fast_methods(),
    ) {
        let mut stats = build(&data);
        let wrapper: Vec<u64> = stats.iter().map(|s| s.max_test_duration).collect();
        rank(method, &mut stats);
        let slowest_kept = kept(&stats)
            .into_iter()
            .filter(|&i| wrapper[i] > 0)
            .map(|i| wrapper[i])
            .max();
        if let Some(limit) = slowest_kept {
            // No measured, succeeded, dropped probe beat a kept one
            for (i, s) in stats.iter().enumerate() {
                if s.ignore && s.succeed && wrapper[i] > 0 {
                    prop_assert!(wrapper[i] >= limit);
                }
            }
        }
    }

    #[test]
    fn prop_geomean_nested_in_scale(data in prop::collection::vec(probe_data(), 0..60)) {
        let mut g1 = build(&data);
        let mut g2 = g1.clone();
        let mut g3 = g1.clone();
        let t1 = rank(RankingMethod::Geomean1, &mut g1).threshold.unwrap();
        let t2 = rank(RankingMethod::Geomean2, &mut g2).threshold.unwrap();
        let t3 = rank(RankingMethod::Geomean3, &mut g3).threshold.unwrap();
        prop_assert!(t1 <= t2 && t2 <= t3);

        let (k1, k2, k3) = (kept(&g1), kept(&g2), kept(&g3));
        prop_assert!(k1.iter().all(|i| k2.contains(i)));
        prop_assert!(k2.iter().all(|i| k3.contains(i)));
    }

    #[test]
    fn prop_geomean_within_range(
        durations in prop::collection::vec(1u64..u64::MAX / 2, 1..200)
    ) {
        let stats: Vec<SyscallStat> = durations
            .iter()
            .map(|&d| {
                let mut s = SyscallStat::new();
                s.record_sample(1);
                s.record_test_duration(d);
                s
            })
            .collect();
        let g = geomean(&stats).unwrap();
        let lo = *durations.iter().min().unwrap() as f64;
        let hi = *durations.iter().max().unwrap() as f64;
        prop_assert!(g.is_finite());
        prop_assert!(g >= lo * (1.0 - 1e-9) && g <= hi * (1.0 + 1e-9), "{} not in [{}, {}]", g, lo, hi);
    }

    #[test]
    fn prop_ranking_purges_wrapper_times(
        data in prop::collection::vec(probe_data(), 0..40),
        method_index in 0usize..9,
    ) {
        let mut stats = build(&data);
        rank(RankingMethod::ALL_METHODS[method_index], &mut stats);
        prop_assert!(stats.iter().all(|s| s.max_test_duration == 0));
    }

    #[test]
    fn prop_shuffle_is_permutation(
        len in 0usize..300,
        seed in any::<u64>(),
        rounds in 1usize..8,
        uniform in any::<bool>(),
    ) {
        let mode = if uniform { ShuffleMode::Uniform } else { ShuffleMode::Legacy };
        let mut idx = ShuffleIndex::new(len, mode, Some(seed));
        for _ in 0..rounds {
            idx.shuffle();
            let mut sorted = idx.as_slice().to_vec();
            sorted.sort_unstable();
            prop_assert_eq!(sorted, (0..len).collect::<Vec<_>>());
        }
        idx.rebuild();
        prop_assert_eq!(idx.len(), len);
    }

    #[test]
    fn prop_report_size_bounded(
        data in prop::collection::vec(probe_data(), 0..60),
        top_n in 0usize..80,
    ) {
        let stats = build(&data);
        let succeeded = stats.iter().filter(|s| s.succeed).count();
        let rows = fastest(&stats, top_n);
        let expected = if top_n == 0 { succeeded } else { top_n.min(succeeded) };
        prop_assert_eq!(rows.len(), expected);
        prop_assert!(rows.iter().all(|&i| stats[i].succeed));
    }

    #[test]
    fn prop_report_sorted_by_average(data in prop::collection::vec(probe_data(), 0..60)) {
        let stats = build(&data);
        let rows = fastest(&stats, 0);
        let mut seen_unmeasured = false;
        let mut last = f64::NEG_INFINITY;
        for i in rows {
            match stats[i].average_duration() {
                Some(avg) => {
                    prop_assert!(!seen_unmeasured, "measured probe after unmeasured one");
                    prop_assert!(avg >= last);
                    last = avg;
                }
                None => seen_unmeasured = true,
            }
        }
    }
}
