//! Per-phase outcome tally.

use std::collections::BTreeMap;
use std::fmt;

/// How one unit of work (a language page, a recording) ended.
pub trait Outcome {
    /// Stable label the outcome is counted under.
    fn label(&self) -> &'static str;

    /// Failure reason, for outcomes that count as failures.
    fn failure(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub unit: String,
    pub reason: String,
}

/// Counts per outcome plus the list of failed units for one phase run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    phase: &'static str,
    counts: BTreeMap<&'static str, u64>,
    failures: Vec<Failure>,
}

impl RunSummary {
    pub fn new(phase: &'static str) -> Self {
        Self {
            phase,
            ..Self::default()
        }
    }

    pub fn record(&mut self, unit: impl Into<String>, outcome: &impl Outcome) {
        *self.counts.entry(outcome.label()).or_default() += 1;
        if let Some(reason) = outcome.failure() {
            self.failures.push(Failure {
                unit: unit.into(),
                reason,
            });
        }
    }

    /// Count a failure that happened outside any [`Outcome`] (e.g. a store write).
    pub fn fail(&mut self, unit: impl Into<String>, reason: impl fmt::Display) {
        *self.counts.entry("error").or_default() += 1;
        self.failures.push(Failure {
            unit: unit.into(),
            reason: reason.to_string(),
        });
    }

    pub fn phase(&self) -> &'static str {
        self.phase
    }

    pub fn count(&self, label: &str) -> u64 {
        self.counts.get(label).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }

    /// Emit the tally, and each failure at warn level.
    pub fn log(&self) {
        for f in &self.failures {
            tracing::warn!(phase = self.phase, unit = %f.unit, reason = %f.reason, "unit failed");
        }
        tracing::info!(phase = self.phase, total = self.total(), summary = %self, "phase finished");
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.counts.is_empty() {
            return f.write_str("nothing to do");
        }
        let mut first = true;
        for (label, n) in &self.counts {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{n} {label}")?;
        }
        Ok(())
    }
}
