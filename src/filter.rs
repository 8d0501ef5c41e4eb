//! Probe selection for -e trace= expressions
//!
//! Supports:
//! - Individual probes: -e trace=getpid,read,write
//! - Probe classes: -e trace=file, -e trace=memory,time
//! - Negation: -e trace=!fork,!process
//! - Regex patterns: -e trace=/^get/
//!
//! With no positive term every probe is selected, minus the negated ones.

use crate::error::{BenchError, Result};
use crate::probe::{Probe, ProbeClass};
use regex::Regex;
use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
struct Terms {
    names: HashSet<String>,
    classes: HashSet<ProbeClass>,
    patterns: Vec<Regex>,
}

impl Terms {
    fn is_empty(&self) -> bool {
        self.names.is_empty() && self.classes.is_empty() && self.patterns.is_empty()
    }

    fn matches(&self, probe: &Probe) -> bool {
        self.names.contains(probe.name)
            || self.classes.contains(&probe.class)
            || self.patterns.iter().any(|re| re.is_match(probe.name))
    }

    fn add(&mut self, term: &str) -> Result<()> {
        if let Some(body) = term.strip_prefix('/') {
            let pattern = body.strip_suffix('/').ok_or_else(|| {
                BenchError::InvalidFilter(format!("unterminated regex: {}", term))
            })?;
            let re = Regex::new(pattern)
                .map_err(|e| BenchError::InvalidFilter(format!("bad regex {}: {}", term, e)))?;
            self.patterns.push(re);
        } else if let Some(class) = ProbeClass::from_name(term) {
            self.classes.insert(class);
        } else {
            self.names.insert(term.to_string());
        }
        Ok(())
    }
}

/// Probe filter that determines which probes take part in a run
#[derive(Debug, Clone, Default)]
pub struct ProbeFilter {
    include: Terms,
    exclude: Terms,
}

impl ProbeFilter {
    /// Create a filter that includes all probes
    pub fn all() -> Self {
        Self::default()
    }

    /// Parse a filter expression like "trace=getpid,file,!fsync"
    pub fn from_expr(expr: &str) -> Result<Self> {
        match expr.strip_prefix("trace=") {
            Some(spec) => Self::from_trace_spec(spec),
            None => Err(BenchError::InvalidFilter(format!(
                "{}. Expected format: trace=SPEC",
                expr
            ))),
        }
    }

    fn from_trace_spec(spec: &str) -> Result<Self> {
        let mut filter = Self::default();
        for part in spec.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            match part.strip_prefix('!') {
                Some(negated) => filter.exclude.add(negated.trim())?,
                None => filter.include.add(part)?,
            }
        }
        Ok(filter)
    }

    /// Check if a probe should run
    pub fn should_run(&self, probe: &Probe) -> bool {
        if self.exclude.matches(probe) {
            return false;
        }
        self.include.is_empty() || self.include.matches(probe)
    }

    /// Selected probes, in registry order; an empty selection is an error
    pub fn apply(&self, probes: &[Probe]) -> Result<Vec<Probe>> {
        let selected: Vec<Probe> = probes
            .iter()
            .filter(|p| self.should_run(p))
            .copied()
            .collect();
        if selected.is_empty() {
            return Err(BenchError::InvalidFilter(
                "expression selects no probes".to_string(),
            ));
        }
        Ok(selected)
    }
}
