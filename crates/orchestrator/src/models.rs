//! Orchestrator Models
//!
//! Data structures for work units, batches, jobs and per-unit results.

use std::path::PathBuf;

use labctl_core::{CoreError, CoreResult, PhaseKind};
use serde::{Deserialize, Serialize};

/// Payload key that distinguishes several units of one module and phase
pub const DISCRIMINATOR_KEY: &str = "file";

/// A module the plan expands phases against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDescriptor {
    /// Module name (unique within a plan)
    pub name: String,
    /// Module root directory
    pub path: PathBuf,
}

impl ModuleDescriptor {
    /// Create a new module descriptor
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// Smallest independently executable piece of analysis or test work.
///
/// Identity is `(module_name, phase, discriminator)`, where the
/// discriminator is the payload's `file` entry when present (one unit per
/// analysed file). `attempt` distinguishes retries of the same unit. Units
/// are immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Unit {
    /// Stable identifier: `<phase>::<module>` or `<phase>::<module>::<file>`
    pub id: String,
    /// Owning module
    pub module_name: String,
    /// Phase this unit belongs to
    pub phase: PhaseKind,
    /// Position in the plan's flat, phase-major unit sequence
    pub ordinal: usize,
    /// Attempt number (1-based)
    pub attempt: u32,
    /// Executor-specific data; opaque to the orchestrator
    pub payload: serde_json::Value,
}

impl Unit {
    /// Create a first-attempt unit.
    pub fn new(
        module_name: impl Into<String>,
        phase: PhaseKind,
        ordinal: usize,
        payload: serde_json::Value,
    ) -> Self {
        let module_name = module_name.into();
        let id = match payload.get(DISCRIMINATOR_KEY).and_then(|v| v.as_str()) {
            Some(file) => format!("{}::{}::{}", phase, module_name, file),
            None => format!("{}::{}", phase, module_name),
        };
        Self {
            id,
            module_name,
            phase,
            ordinal,
            attempt: 1,
            payload,
        }
    }

    /// Create the unit for the next attempt. The original is left untouched.
    pub fn retry(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }

    /// Read a string field from the payload.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }
}

/// What a `UnitExecutor` reports for one unit.
///
/// Identity and duration are stamped on by the worker when it turns the
/// outcome into a `UnitResult`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitOutcome {
    pub success: bool,
    pub tests_run: u64,
    pub tests_passed: u64,
    pub tests_failed: u64,
    pub details: Vec<String>,
    pub error: Option<String>,
}

impl UnitOutcome {
    /// A single passing check.
    pub fn passed() -> Self {
        Self::from_counts(1, 1, 0)
    }

    /// A single failing check with an error message.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            tests_run: 1,
            tests_passed: 0,
            tests_failed: 1,
            details: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// Outcome for a unit that ran several assertions. Succeeds when none failed.
    pub fn from_counts(tests_run: u64, tests_passed: u64, tests_failed: u64) -> Self {
        Self {
            success: tests_failed == 0,
            tests_run,
            tests_passed,
            tests_failed,
            details: Vec::new(),
            error: None,
        }
    }

    /// Attach detail lines.
    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }

    /// Attach an error message. Does not change `success`.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Result of running one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitResult {
    pub unit_id: String,
    pub module_name: String,
    pub phase: PhaseKind,
    pub ordinal: usize,
    pub attempt: u32,
    pub success: bool,
    pub tests_run: u64,
    pub tests_passed: u64,
    pub tests_failed: u64,
    pub duration_seconds: f64,
    pub details: Vec<String>,
    pub error: Option<String>,
}

impl UnitResult {
    /// Stamp a unit's identity and measured duration onto an executor outcome.
    pub fn from_outcome(unit: &Unit, outcome: UnitOutcome, duration_seconds: f64) -> Self {
        Self {
            unit_id: unit.id.clone(),
            module_name: unit.module_name.clone(),
            phase: unit.phase,
            ordinal: unit.ordinal,
            attempt: unit.attempt,
            success: outcome.success,
            tests_run: outcome.tests_run,
            tests_passed: outcome.tests_passed,
            tests_failed: outcome.tests_failed,
            duration_seconds,
            details: outcome.details,
            error: outcome.error,
        }
    }

    /// Failed result for a unit whose worker died before reporting.
    pub fn worker_failure(unit: &Unit, error: impl Into<String>) -> Self {
        Self::from_outcome(unit, UnitOutcome::failed(error), 0.0)
    }
}

/// A bounded, ordered group of units dispatched together to one worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    /// Batch index within its partition (0-based)
    pub index: usize,
    /// Units in dispatch order
    pub units: Vec<Unit>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Lifecycle state of a job. Transitions are monotonic:
/// `Queued -> Running -> {Completed | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobState {
    /// Whether the job has finished (successfully or not).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Queued, JobState::Running)
                | (JobState::Running, JobState::Completed)
                | (JobState::Running, JobState::Failed)
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Queued => write!(f, "queued"),
            JobState::Running => write!(f, "running"),
            JobState::Completed => write!(f, "completed"),
            JobState::Failed => write!(f, "failed"),
        }
    }
}

/// One batch assigned to one worker slot.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: u64,
    pub batch: Batch,
    state: JobState,
    results: Vec<UnitResult>,
}

impl Job {
    /// Create a queued job.
    pub fn new(id: u64, batch: Batch) -> Self {
        Self {
            id,
            batch,
            state: JobState::Queued,
            results: Vec::new(),
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Mark the job as handed to a worker.
    pub fn start(&mut self) -> CoreResult<()> {
        self.transition(JobState::Running)
    }

    /// Record the worker's results.
    pub fn complete(&mut self, results: Vec<UnitResult>) -> CoreResult<()> {
        self.transition(JobState::Completed)?;
        self.results = results;
        Ok(())
    }

    /// Record a worker failure. Every unit of the batch becomes a failed result.
    pub fn fail(&mut self, reason: &str) -> CoreResult<()> {
        self.transition(JobState::Failed)?;
        self.results = self
            .batch
            .units
            .iter()
            .map(|unit| UnitResult::worker_failure(unit, format!("worker failed: {}", reason)))
            .collect();
        Ok(())
    }

    /// Take the drained results out of a finished job.
    pub fn take_results(&mut self) -> Vec<UnitResult> {
        std::mem::take(&mut self.results)
    }

    fn transition(&mut self, next: JobState) -> CoreResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(CoreError::internal(format!(
                "job {} cannot move from {} to {}",
                self.id, self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }
}
