//! Sysrank - self-calibrating system call benchmark
//!
//! Times individual system calls through a registry of probes, ranks them
//! by wrapper time to pick the set worth measuring, then runs that set in
//! shuffled rounds and reports the fastest calls by mean latency.

pub mod cli;
pub mod clock;
pub mod config;
pub mod driver;
pub mod error;
pub mod filter;
pub mod fixtures;
pub mod handoff;
pub mod probe;
pub mod probes;
pub mod rank;
pub mod report;
pub mod shuffle;
pub mod stats;
