//! Run configuration
//!
//! Defaults match the historical stressor: ten seconds, FAST75 ranking, the
//! ten fastest probes reported. A TOML file can supply any subset of the
//! fields; command-line flags are applied on top.

use crate::error::{BenchError, Result};
use crate::filter::ProbeFilter;
use crate::rank::RankingMethod;
use crate::shuffle::ShuffleMode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for one benchmark run
///
/// # Example
/// ```
/// use sysrank::config::BenchConfig;
/// use sysrank::rank::RankingMethod;
///
/// let config = BenchConfig::default();
/// assert_eq!(config.method, RankingMethod::Fast75);
/// assert_eq!(config.top_n, 10);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchConfig {
    /// Time budget in seconds (0 = no deadline, `max_ops` must then be set)
    pub duration: u64,

    /// Stop after this many probe invocations (0 = unlimited)
    pub max_ops: u64,

    /// Probe selection strategy for the ranking pass
    pub method: RankingMethod,

    /// How many of the fastest probes to report (0 = all that succeeded)
    pub top_n: usize,

    /// Shuffle RNG seed; `None` draws from OS entropy
    pub seed: Option<u64>,

    /// Permutation used between rounds
    pub shuffle: ShuffleMode,

    /// Probe filter expression, e.g. `trace=file,!fsync`
    pub filter: Option<String>,

    /// Full rounds run before the ranking pass
    pub calibration_rounds: u32,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            duration: 10,
            max_ops: 0,
            method: RankingMethod::default(),
            top_n: 10,
            seed: None,
            shuffle: ShuffleMode::default(),
            filter: None,
            calibration_rounds: 1,
        }
    }
}

impl BenchConfig {
    /// Parse a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| BenchError::InvalidConfig(e.to_string()))
    }

    /// Load a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn time_budget(&self) -> Duration {
        Duration::from_secs(self.duration)
    }

    /// Compiled probe filter (all probes when no expression is set)
    pub fn probe_filter(&self) -> Result<ProbeFilter> {
        match &self.filter {
            Some(expr) => ProbeFilter::from_expr(expr),
            None => Ok(ProbeFilter::all()),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.duration == 0 && self.max_ops == 0 {
            return Err(BenchError::InvalidConfig(
                "duration and max_ops cannot both be 0 (the run would never end)".to_string(),
            ));
        }

        if self.calibration_rounds == 0 {
            return Err(BenchError::InvalidConfig(
                "calibration_rounds must be >= 1".to_string(),
            ));
        }

        self.probe_filter()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BenchConfig::default();
        assert_eq!(config.duration, 10);
        assert_eq!(config.max_ops, 0);
        assert_eq!(config.method, RankingMethod::Fast75);
        assert_eq!(config.top_n, 10);
        assert_eq!(config.shuffle, ShuffleMode::Legacy);
        assert_eq!(config.calibration_rounds, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = BenchConfig::from_toml_str(
            r#"
            method = "geomean2"
            top_n = 5
            seed = 1234
            "#,
        )
        .unwrap();
        assert_eq!(config.method, RankingMethod::Geomean2);
        assert_eq!(config.top_n, 5);
        assert_eq!(config.seed, Some(1234));
        assert_eq!(config.duration, 10);
    }

    #[test]
    fn test_toml_rejects_unknown_field() {
        assert!(BenchConfig::from_toml_str("durration = 3").is_err());
    }

    #[test]
    fn test_toml_rejects_bad_method() {
        let err = BenchConfig::from_toml_str("method = \"fast33\"").unwrap_err();
        assert!(err.to_string().contains("fast33"));
    }

    #[test]
    fn test_toml_shuffle_mode() {
        let config = BenchConfig::from_toml_str("shuffle = \"uniform\"").unwrap();
        assert_eq!(config.shuffle, ShuffleMode::Uniform);
    }

    #[test]
    #[allow(clippy::field_reassign_with_default)]
    fn test_unbounded_run_rejected() {
        let mut config = BenchConfig::default();
        config.duration = 0;
        assert!(config.validate().is_err());
        config.max_ops = 100;
        assert!(config.validate().is_ok());
    }

    #[test]
    #[allow(clippy::field_reassign_with_default)]
    fn test_zero_calibration_rounds_rejected() {
        let mut config = BenchConfig::default();
        config.calibration_rounds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    #[allow(clippy::field_reassign_with_default)]
    fn test_bad_filter_rejected() {
        let mut config = BenchConfig::default();
        config.filter = Some("open,read".to_string());
        assert!(matches!(config.validate(), Err(BenchError::InvalidFilter(_))));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sysrank.toml");
        std::fs::write(&path, "duration = 2\nmax_ops = 50\n").unwrap();
        let config = BenchConfig::from_file(&path).unwrap();
        assert_eq!(config.time_budget(), Duration::from_secs(2));
        assert_eq!(config.max_ops, 50);
    }
}
