//! Per-run bookkeeping shared by the pooled scheduler and the sequential
//! executor: phase expansion, draining, retries, the fatal-phase rule and
//! the final outcome.

use std::collections::HashMap;
use std::time::Instant;

use labctl_core::{CoreResult, OrchestratorContext, PhaseKind, ProgressEvent};

use crate::aggregator::ResultAggregator;
use crate::executor::{round_secs, UnitContext};
use crate::models::{Batch, Job, JobState, Unit};
use crate::outcome::{ExecutionOutcome, FatalPhaseFailure, RunStatus};
use crate::partition::partition;
use crate::plan::ExecutionPlan;

/// What the driver should do after a phase finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PhaseVerdict {
    Continue,
    Halt,
}

pub(crate) struct RunState<'a> {
    ctx: &'a OrchestratorContext,
    plan: &'a ExecutionPlan,
    aggregator: ResultAggregator,
    /// Latest attempt of every unit of the current phase, by ordinal
    phase_units: HashMap<usize, Unit>,
    phases_run: Vec<PhaseKind>,
    halted_by: Option<FatalPhaseFailure>,
    interrupted: bool,
    peak_active_jobs: usize,
    used_fallback: bool,
    next_job_id: u64,
    started: Instant,
}

impl<'a> RunState<'a> {
    pub(crate) fn new(ctx: &'a OrchestratorContext, plan: &'a ExecutionPlan) -> Self {
        Self {
            ctx,
            plan,
            aggregator: ResultAggregator::new(),
            phase_units: HashMap::new(),
            phases_run: Vec::new(),
            halted_by: None,
            interrupted: false,
            peak_active_jobs: 0,
            used_fallback: false,
            next_job_id: 1,
            started: Instant::now(),
        }
    }

    pub(crate) fn ctx(&self) -> &'a OrchestratorContext {
        self.ctx
    }

    pub(crate) fn plan(&self) -> &'a ExecutionPlan {
        self.plan
    }

    pub(crate) fn unit_context(&self) -> UnitContext {
        UnitContext::from_config(&self.plan.config)
    }

    pub(crate) fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    /// Expand and partition one phase.
    pub(crate) fn begin_phase(&mut self, phase: PhaseKind) -> CoreResult<Vec<Batch>> {
        let units = self.plan.units_for(phase);
        self.phase_units = units.iter().map(|u| (u.ordinal, u.clone())).collect();
        let unit_count = units.len();
        let batches = partition(units, self.plan.config.batch_size)?;

        self.phases_run.push(phase);
        tracing::info!(
            phase = %phase,
            units = unit_count,
            batches = batches.len(),
            "starting phase"
        );
        self.ctx.emit(ProgressEvent::PhaseStarted {
            phase,
            units: unit_count,
            batches: batches.len(),
        });
        Ok(batches)
    }

    /// Wrap a batch in a fresh job.
    pub(crate) fn new_job(&mut self, batch: Batch) -> Job {
        let job = Job::new(self.next_job_id, batch);
        self.next_job_id += 1;
        job
    }

    pub(crate) fn note_active(&mut self, active: usize) {
        self.peak_active_jobs = self.peak_active_jobs.max(active);
    }

    pub(crate) fn mark_fallback(&mut self, phase: PhaseKind, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(phase = %phase, reason = %reason, "running phase sequentially");
        self.used_fallback = true;
        self.ctx.emit(ProgressEvent::FallbackEngaged { phase, reason });
    }

    pub(crate) fn mark_interrupted(&mut self, phase: PhaseKind) {
        if self.interrupted {
            return;
        }
        tracing::warn!(phase = %phase, "stop requested, no further batches will be dispatched");
        self.interrupted = true;
        self.ctx.emit(ProgressEvent::Interrupted { phase });
    }

    /// Move a finished job's results into the aggregator.
    ///
    /// First attempts are appended; retry attempts replace the earlier
    /// result for the same unit.
    pub(crate) fn drain(&mut self, phase: PhaseKind, job: &mut Job) {
        let worker_failed = job.state() == JobState::Failed;
        let results = job.take_results();
        let failed = results.iter().filter(|r| !r.success).count();
        let passed = results.len() - failed;

        let (first, retried): (Vec<_>, Vec<_>) = results.into_iter().partition(|r| r.attempt <= 1);
        self.aggregator.accumulate(first);
        self.aggregator.supersede(retried);

        tracing::debug!(
            phase = %phase,
            job_id = job.id,
            passed,
            failed,
            worker_failed,
            "drained job"
        );
        self.ctx.emit(ProgressEvent::JobDrained {
            phase,
            job_id: job.id,
            worker_failed,
            passed,
            failed,
        });
    }

    /// Batches for the next retry round of `phase`, if any are allowed.
    ///
    /// `completed_attempt` is the attempt number that just finished.
    pub(crate) fn retry_batches(
        &mut self,
        phase: PhaseKind,
        completed_attempt: u32,
    ) -> CoreResult<Vec<Batch>> {
        if completed_attempt > self.plan.config.retry_count {
            return Ok(Vec::new());
        }

        let failed: Vec<usize> = self
            .aggregator
            .failures(phase)
            .into_iter()
            .map(|r| r.ordinal)
            .collect();
        let mut retry_units: Vec<Unit> = failed
            .iter()
            .filter_map(|ordinal| self.phase_units.get(ordinal))
            .map(Unit::retry)
            .collect();
        if retry_units.is_empty() {
            return Ok(Vec::new());
        }
        retry_units.sort_by_key(|u| u.ordinal);

        tracing::info!(
            phase = %phase,
            attempt = completed_attempt + 1,
            units = retry_units.len(),
            "retrying failed units"
        );
        for unit in &retry_units {
            self.phase_units.insert(unit.ordinal, unit.clone());
        }
        partition(retry_units, self.plan.config.batch_size)
    }

    /// Close out a phase and apply the fatal-phase rule.
    pub(crate) fn finish_phase(&mut self, phase: PhaseKind) -> PhaseVerdict {
        let summary = self.aggregator.phase_summary(phase);
        tracing::info!(
            phase = %phase,
            passed = summary.passed_units,
            failed = summary.failed_units,
            duration_secs = summary.duration_seconds,
            "phase completed"
        );
        self.ctx.emit(ProgressEvent::PhaseCompleted {
            phase,
            passed: summary.passed_units,
            failed: summary.failed_units,
        });

        if !phase.is_fatal() || summary.failed_units == 0 || self.interrupted {
            return PhaseVerdict::Continue;
        }

        let failed_units: Vec<String> = self
            .aggregator
            .failures(phase)
            .into_iter()
            .map(|r| r.unit_id.clone())
            .collect();
        let skipped_phases = self.unvisited_phases();
        tracing::error!(
            phase = %phase,
            failed_units = failed_units.len(),
            skipped = ?skipped_phases,
            "fatal phase failed, halting run"
        );
        self.ctx.emit(ProgressEvent::FatalHalt {
            phase,
            failed_units: failed_units.len(),
        });
        self.halted_by = Some(FatalPhaseFailure {
            phase,
            failed_units,
            skipped_phases,
        });
        PhaseVerdict::Halt
    }

    fn unvisited_phases(&self) -> Vec<PhaseKind> {
        self.plan
            .phases
            .iter()
            .filter(|p| !self.phases_run.contains(p))
            .copied()
            .collect()
    }

    pub(crate) fn into_outcome(self) -> ExecutionOutcome {
        let report = self.aggregator.summarize();
        let status = if self.halted_by.is_some() {
            RunStatus::Halted
        } else if self.interrupted {
            RunStatus::Interrupted
        } else if report.is_clean() {
            RunStatus::Passed
        } else {
            RunStatus::CompletedWithFailures
        };
        let skipped_phases = self.unvisited_phases();

        tracing::info!(
            status = %status,
            units = report.total_units,
            failed_units = report.failed_units,
            success_rate = report.success_rate,
            "run finished"
        );

        ExecutionOutcome {
            status,
            results: self.aggregator.ordered_results(),
            report,
            halted_by: self.halted_by,
            phases_run: self.phases_run,
            skipped_phases,
            peak_active_jobs: self.peak_active_jobs,
            used_fallback: self.used_fallback,
            wall_clock_seconds: round_secs(self.started.elapsed()),
        }
    }
}
