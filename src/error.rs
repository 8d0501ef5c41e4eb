//! Error types for the benchmark engine
//!
//! Probe failures never surface here: a probe that returns an errno simply
//! contributes no sample for that round. Only problems that stop the engine
//! from running at all (missing fixtures, bad configuration) are errors.

use thiserror::Error;

/// Errors raised by engine setup and configuration
#[derive(Error, Debug)]
pub enum BenchError {
    #[error("No resource: {0}")]
    NoResource(String),

    #[error("Invalid ranking method '{0}' (expected all, fast10, fast25, fast50, fast75, fast90, geomean1, geomean2 or geomean3)")]
    InvalidMethod(String),

    #[error("Invalid probe filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BenchError>;
