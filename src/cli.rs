//! CLI argument parsing for sysrank

use crate::config::BenchConfig;
use crate::rank::RankingMethod;
use crate::shuffle::ShuffleMode;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Output format for the final report
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    Text,
    /// JSON format for machine parsing
    Json,
    /// CSV format for spreadsheet analysis
    Csv,
}

#[derive(Parser, Debug)]
#[command(name = "sysrank")]
#[command(version)]
#[command(
    about = "Self-calibrating system call benchmark: times each syscall, ranks them and reports the fastest",
    long_about = None
)]
pub struct Cli {
    /// Run for this many seconds (0 = until --ops is reached)
    #[arg(short = 't', long = "duration", value_name = "SECS")]
    pub duration: Option<u64>,

    /// Stop after this many probe invocations (bogo-ops)
    #[arg(long = "ops", value_name = "N")]
    pub ops: Option<u64>,

    /// Ranking method: all, fast10, fast25, fast50, fast75, fast90, geomean1, geomean2, geomean3
    #[arg(short = 'm', long = "method", value_name = "METHOD")]
    pub method: Option<RankingMethod>,

    /// Report the N fastest system calls (0 = all that succeeded)
    #[arg(short = 'n', long = "top", value_name = "N")]
    pub top: Option<usize>,

    /// Seed the shuffle RNG for a reproducible execution order
    #[arg(long = "seed", value_name = "SEED")]
    pub seed: Option<u64>,

    /// Shuffle algorithm between rounds
    #[arg(long = "shuffle", value_enum)]
    pub shuffle: Option<ShuffleMode>,

    /// Filter probes (e.g., -e trace=getpid,read or -e trace=file,!fsync or -e trace=/^get/)
    #[arg(short = 'e', long = "expr", value_name = "EXPR")]
    pub filter: Option<String>,

    /// Full rounds to run before the ranking pass
    #[arg(long = "calibration-rounds", value_name = "N")]
    pub calibration_rounds: Option<u32>,

    /// Output format (text, json or csv)
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Load settings from a TOML file; command-line flags take precedence
    #[arg(long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// List the available probes and exit
    #[arg(long = "list")]
    pub list: bool,

    /// Log progress to stderr
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Enable debug tracing output to stderr
    #[arg(long = "debug")]
    pub debug: bool,
}

impl Cli {
    /// Overlay the flags that were given on top of `config`
    pub fn apply_to(&self, config: &mut BenchConfig) {
        if let Some(duration) = self.duration {
            config.duration = duration;
        }
        if let Some(ops) = self.ops {
            config.max_ops = ops;
        }
        if let Some(method) = self.method {
            config.method = method;
        }
        if let Some(top) = self.top {
            config.top_n = top;
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if let Some(shuffle) = self.shuffle {
            config.shuffle = shuffle;
        }
        if let Some(ref filter) = self.filter {
            config.filter = Some(filter.clone());
        }
        if let Some(rounds) = self.calibration_rounds {
            config.calibration_rounds = rounds;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["sysrank"]);
        assert!(cli.duration.is_none());
        assert!(cli.method.is_none());
        assert_eq!(cli.format, OutputFormat::Text);
        assert!(!cli.list);
        assert!(!cli.verbose);
        assert!(!cli.debug);
    }

    #[test]
    fn test_cli_method_case_insensitive() {
        let cli = Cli::parse_from(["sysrank", "-m", "GEOMEAN2"]);
        assert_eq!(cli.method, Some(RankingMethod::Geomean2));
        let cli = Cli::parse_from(["sysrank", "--method", "fast10"]);
        assert_eq!(cli.method, Some(RankingMethod::Fast10));
    }

    #[test]
    fn test_cli_bad_method_rejected() {
        assert!(Cli::try_parse_from(["sysrank", "-m", "fast33"]).is_err());
    }

    #[test]
    fn test_cli_filter_flag() {
        let cli = Cli::parse_from(["sysrank", "-e", "trace=file,!fsync"]);
        assert_eq!(cli.filter.as_deref(), Some("trace=file,!fsync"));
    }

    #[test]
    fn test_cli_format_json() {
        let cli = Cli::parse_from(["sysrank", "--format", "json"]);
        assert_eq!(cli.format, OutputFormat::Json);
    }

    #[test]
    fn test_cli_shuffle_mode() {
        let cli = Cli::parse_from(["sysrank", "--shuffle", "uniform"]);
        assert_eq!(cli.shuffle, Some(ShuffleMode::Uniform));
    }

    #[test]
    fn test_apply_overrides_only_given_flags() {
        let mut config = BenchConfig {
            duration: 30,
            top_n: 5,
            ..BenchConfig::default()
        };
        let cli = Cli::parse_from(["sysrank", "-t", "2", "--ops", "500", "--seed", "9"]);
        cli.apply_to(&mut config);
        assert_eq!(config.duration, 2);
        assert_eq!(config.max_ops, 500);
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.top_n, 5);
        assert_eq!(config.method, RankingMethod::Fast75);
    }

    #[test]
    fn test_cli_list_and_top() {
        let cli = Cli::parse_from(["sysrank", "--list", "-n", "0"]);
        assert!(cli.list);
        assert_eq!(cli.top, Some(0));
    }
}
