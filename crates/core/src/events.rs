//! Progress Events
//!
//! Events emitted by the driving loop as a run advances. Observers are
//! invoked on the driving thread only, never from worker threads.

use serde::{Deserialize, Serialize};

use crate::phase::PhaseKind;

/// A progress notification from the scheduler or sequential executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A phase was expanded and is about to run.
    PhaseStarted {
        phase: PhaseKind,
        units: usize,
        batches: usize,
    },
    /// A batch was handed to a background worker.
    BatchDispatched {
        phase: PhaseKind,
        job_id: u64,
        units: usize,
        active_jobs: usize,
    },
    /// A finished job had its results drained into the aggregator.
    JobDrained {
        phase: PhaseKind,
        job_id: u64,
        worker_failed: bool,
        passed: usize,
        failed: usize,
    },
    /// Every batch of a phase (including retries) has been drained.
    PhaseCompleted {
        phase: PhaseKind,
        passed: usize,
        failed: usize,
    },
    /// The parallel substrate was unavailable or disabled for this phase.
    FallbackEngaged { phase: PhaseKind, reason: String },
    /// A fatal phase failed; later phases are skipped.
    FatalHalt { phase: PhaseKind, failed_units: usize },
    /// A stop was requested; no further batches are dispatched.
    Interrupted { phase: PhaseKind },
}

/// Receives progress events.
pub trait ProgressObserver: Send + Sync {
    /// Called once per event, in emission order.
    fn on_event(&self, event: &ProgressEvent);
}

impl<F> ProgressObserver for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_event(&self, event: &ProgressEvent) {
        self(event)
    }
}
