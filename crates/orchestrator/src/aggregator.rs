//! Result Aggregator
//!
//! Accumulates per-unit results as jobs are drained and projects them into
//! an `AggregateReport`. Completion order never leaks into the report:
//! results are stable-sorted by plan ordinal (phase order, then module
//! discovery order) before grouping.

use indexmap::IndexMap;
use labctl_core::PhaseKind;
use serde::{Deserialize, Serialize};

use crate::models::UnitResult;

/// Per-phase statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseSummary {
    pub phase: PhaseKind,
    pub units: usize,
    pub passed_units: usize,
    pub failed_units: usize,
    pub tests_passed: u64,
    pub tests_failed: u64,
    pub duration_seconds: f64,
}

/// Derived summary of a run. Recomputed on demand, never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateReport {
    pub total_units: usize,
    pub failed_units: usize,
    pub total_tests_run: u64,
    pub total_passed: u64,
    pub total_failed: u64,
    /// Percentage with two decimals; 0 when nothing ran.
    pub success_rate: f64,
    pub per_module: IndexMap<String, Vec<UnitResult>>,
    pub per_phase: Vec<PhaseSummary>,
    /// Sum of unit durations
    pub total_duration_seconds: f64,
    /// Failed attempts replaced by a later retry
    pub superseded_attempts: usize,
}

impl AggregateReport {
    /// Whether nothing failed.
    pub fn is_clean(&self) -> bool {
        self.total_failed == 0 && self.failed_units == 0
    }
}

/// Incremental accumulator. Owned by the driving loop; workers never touch it.
#[derive(Debug, Clone, Default)]
pub struct ResultAggregator {
    results: Vec<UnitResult>,
    superseded: Vec<UnitResult>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add freshly drained results.
    pub fn accumulate(&mut self, results: impl IntoIterator<Item = UnitResult>) {
        self.results.extend(results);
    }

    /// Replace earlier results for the same units with retry results.
    ///
    /// Units are matched by plan ordinal, so two units sharing an id never
    /// replace each other. A result for a unit not seen before is added.
    pub fn supersede(&mut self, results: impl IntoIterator<Item = UnitResult>) {
        for result in results {
            match self.results.iter().position(|r| r.ordinal == result.ordinal) {
                Some(idx) => {
                    let previous = std::mem::replace(&mut self.results[idx], result);
                    self.superseded.push(previous);
                }
                None => self.results.push(result),
            }
        }
    }

    /// Number of results held.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Results in plan order.
    pub fn ordered_results(&self) -> Vec<UnitResult> {
        let mut sorted = self.results.clone();
        sorted.sort_by_key(|r| r.ordinal);
        sorted
    }

    /// Current failed results of one phase.
    pub fn failures(&self, phase: PhaseKind) -> Vec<&UnitResult> {
        self.results
            .iter()
            .filter(|r| r.phase == phase && !r.success)
            .collect()
    }

    /// Statistics for one phase.
    pub fn phase_summary(&self, phase: PhaseKind) -> PhaseSummary {
        summarize_phase(phase, self.results.iter().filter(|r| r.phase == phase))
    }

    /// Pure projection of the accumulated results.
    pub fn summarize(&self) -> AggregateReport {
        let sorted = self.ordered_results();

        let total_units = sorted.len();
        let failed_units = sorted.iter().filter(|r| !r.success).count();
        let total_tests_run: u64 = sorted.iter().map(|r| r.tests_run).sum();
        let total_passed: u64 = sorted.iter().map(|r| r.tests_passed).sum();
        let total_failed: u64 = sorted.iter().map(|r| r.tests_failed).sum();

        let denominator = if total_tests_run > 0 {
            total_tests_run
        } else {
            total_units as u64
        };
        let success_rate = percentage(total_passed, denominator);

        let mut phase_order: Vec<PhaseKind> = Vec::new();
        for result in &sorted {
            if !phase_order.contains(&result.phase) {
                phase_order.push(result.phase);
            }
        }
        let per_phase = phase_order
            .into_iter()
            .map(|phase| summarize_phase(phase, sorted.iter().filter(|r| r.phase == phase)))
            .collect();

        let total_duration_seconds =
            round_to(sorted.iter().map(|r| r.duration_seconds).sum(), 3);

        let mut per_module: IndexMap<String, Vec<UnitResult>> = IndexMap::new();
        for result in sorted {
            per_module
                .entry(result.module_name.clone())
                .or_default()
                .push(result);
        }

        AggregateReport {
            total_units,
            failed_units,
            total_tests_run,
            total_passed,
            total_failed,
            success_rate,
            per_module,
            per_phase,
            total_duration_seconds,
            superseded_attempts: self.superseded.len(),
        }
    }
}

fn summarize_phase<'a>(
    phase: PhaseKind,
    results: impl Iterator<Item = &'a UnitResult>,
) -> PhaseSummary {
    let mut summary = PhaseSummary {
        phase,
        units: 0,
        passed_units: 0,
        failed_units: 0,
        tests_passed: 0,
        tests_failed: 0,
        duration_seconds: 0.0,
    };
    for r in results {
        summary.units += 1;
        if r.success {
            summary.passed_units += 1;
        } else {
            summary.failed_units += 1;
        }
        summary.tests_passed += r.tests_passed;
        summary.tests_failed += r.tests_failed;
        summary.duration_seconds += r.duration_seconds;
    }
    summary.duration_seconds = round_to(summary.duration_seconds, 3);
    summary
}

fn percentage(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    round_to(numerator as f64 / denominator as f64 * 100.0, 2)
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
