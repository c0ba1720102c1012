//! Unit Executors
//!
//! The `UnitExecutor` seam through which the orchestrator hands work to the
//! outside world, the phase-to-handler lookup table, and the batch worker
//! body shared by the pooled and sequential paths.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use labctl_core::{CoreError, CoreResult, PhaseKind};

use crate::models::{Batch, Unit, UnitOutcome, UnitResult};
use crate::profile::{ExecutionConfig, Verbosity};

/// Per-unit settings handed to an executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitContext {
    /// Executors should stop work at this limit. A unit reported after it
    /// elapsed is recorded as failed either way.
    pub timeout_per_unit: Duration,
    pub verbosity: Verbosity,
}

impl UnitContext {
    pub fn from_config(config: &ExecutionConfig) -> Self {
        Self {
            timeout_per_unit: config.timeout_per_unit(),
            verbosity: config.verbosity,
        }
    }
}

/// Performs the actual analysis or test work for one unit.
///
/// Implementations may block. They must not panic on unit-level failure;
/// failures are returned as a failed `UnitOutcome`. A panic is still caught
/// by the worker and recorded as a failed result.
pub trait UnitExecutor: Send + Sync {
    fn execute(&self, unit: &Unit, ctx: &UnitContext) -> UnitOutcome;
}

impl<F> UnitExecutor for F
where
    F: Fn(&Unit, &UnitContext) -> UnitOutcome + Send + Sync,
{
    fn execute(&self, unit: &Unit, ctx: &UnitContext) -> UnitOutcome {
        self(unit, ctx)
    }
}

/// Lookup table from phase to the executor that handles it.
#[derive(Clone, Default)]
pub struct PhaseHandlers {
    handlers: HashMap<PhaseKind, Arc<dyn UnitExecutor>>,
    fallback: Option<Arc<dyn UnitExecutor>>,
}

impl PhaseHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use one executor for every phase without a dedicated handler.
    pub fn with_fallback(mut self, executor: Arc<dyn UnitExecutor>) -> Self {
        self.fallback = Some(executor);
        self
    }

    /// Register a handler for a phase (builder form).
    pub fn with(mut self, phase: PhaseKind, executor: Arc<dyn UnitExecutor>) -> Self {
        self.register(phase, executor);
        self
    }

    /// Register a handler for a phase, replacing any previous one.
    pub fn register(&mut self, phase: PhaseKind, executor: Arc<dyn UnitExecutor>) {
        self.handlers.insert(phase, executor);
    }

    /// Handler for a phase, or the fallback.
    pub fn get(&self, phase: PhaseKind) -> Option<Arc<dyn UnitExecutor>> {
        self.handlers
            .get(&phase)
            .or(self.fallback.as_ref())
            .cloned()
    }

    /// Fail unless every phase has a handler.
    pub fn ensure_covers(&self, phases: &[PhaseKind]) -> CoreResult<()> {
        let missing: Vec<&str> = phases
            .iter()
            .filter(|phase| self.get(**phase).is_none())
            .map(|phase| phase.as_str())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(CoreError::invalid_configuration(format!(
                "no executor registered for phase(s): {}",
                missing.join(", ")
            )))
        }
    }
}

impl std::fmt::Debug for PhaseHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut phases: Vec<&PhaseKind> = self.handlers.keys().collect();
        phases.sort();
        f.debug_struct("PhaseHandlers")
            .field("phases", &phases)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

/// Run every unit of a batch in order on the current thread.
///
/// This is the body of one job: the whole batch is one unit of dispatch and
/// is never split or cancelled part-way.
pub fn run_batch(batch: &Batch, executor: &dyn UnitExecutor, ctx: &UnitContext) -> Vec<UnitResult> {
    batch
        .units
        .iter()
        .map(|unit| run_unit(unit, executor, ctx))
        .collect()
}

fn run_unit(unit: &Unit, executor: &dyn UnitExecutor, ctx: &UnitContext) -> UnitResult {
    let start = Instant::now();
    let mut outcome = match panic::catch_unwind(AssertUnwindSafe(|| executor.execute(unit, ctx))) {
        Ok(outcome) => outcome,
        Err(payload) => UnitOutcome::failed(format!(
            "executor panicked: {}",
            panic_message(payload.as_ref())
        )),
    };
    let elapsed = start.elapsed();

    if elapsed > ctx.timeout_per_unit {
        tracing::warn!(
            unit = %unit.id,
            elapsed_secs = elapsed.as_secs_f64(),
            timeout = ?ctx.timeout_per_unit,
            "unit exceeded its timeout"
        );
        if outcome.success {
            outcome.success = false;
            outcome.error = Some(format!("Unit exceeded timeout of {:?}", ctx.timeout_per_unit));
        }
    }

    UnitResult::from_outcome(unit, outcome, round_secs(elapsed))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Seconds with millisecond precision.
pub(crate) fn round_secs(d: Duration) -> f64 {
    (d.as_secs_f64() * 1000.0).round() / 1000.0
}
