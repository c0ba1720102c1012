//! Run Outcome
//!
//! What a top-level `execute()` call returns: the aggregate report, the raw
//! results, and how the run ended.

use labctl_core::{CoreError, CoreResult, PhaseKind};
use serde::{Deserialize, Serialize};

use crate::aggregator::AggregateReport;
use crate::models::UnitResult;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every executed unit passed.
    Passed,
    /// All phases ran; some units failed.
    CompletedWithFailures,
    /// A fatal phase failed and later phases were skipped.
    Halted,
    /// A stop was requested before the plan finished.
    Interrupted,
}

impl RunStatus {
    /// Process exit code for this status.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunStatus::Passed => 0,
            RunStatus::CompletedWithFailures => 1,
            RunStatus::Halted => 2,
            RunStatus::Interrupted => 3,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Passed => write!(f, "passed"),
            RunStatus::CompletedWithFailures => write!(f, "completed_with_failures"),
            RunStatus::Halted => write!(f, "halted"),
            RunStatus::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Details of a fatal-phase halt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FatalPhaseFailure {
    pub phase: PhaseKind,
    pub failed_units: Vec<String>,
    pub skipped_phases: Vec<PhaseKind>,
}

/// Result of executing a plan. Partial when halted or interrupted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    pub status: RunStatus,
    pub report: AggregateReport,
    /// Final results in plan order
    pub results: Vec<UnitResult>,
    pub halted_by: Option<FatalPhaseFailure>,
    pub phases_run: Vec<PhaseKind>,
    pub skipped_phases: Vec<PhaseKind>,
    /// Highest number of simultaneously active jobs observed
    pub peak_active_jobs: usize,
    /// Whether any phase ran on the sequential path
    pub used_fallback: bool,
    pub wall_clock_seconds: f64,
}

impl ExecutionOutcome {
    pub fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }

    /// Whether this is a partial result.
    pub fn is_partial(&self) -> bool {
        matches!(self.status, RunStatus::Halted | RunStatus::Interrupted)
    }

    /// Convert a fatal halt into an error for callers that want one.
    pub fn into_result(self) -> CoreResult<Self> {
        match &self.halted_by {
            Some(fatal) => Err(CoreError::fatal_phase(
                fatal.phase.as_str(),
                fatal.failed_units.len(),
            )),
            None => Ok(self),
        }
    }
}
