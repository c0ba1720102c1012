//! Batch Scheduler
//!
//! Drives a plan through a bounded pool of background workers. Each phase
//! is partitioned into batches; each batch becomes one job running on
//! tokio's blocking pool. The driving loop keeps at most `max_concurrency`
//! jobs active, polls them every `poll_interval`, and drains finished jobs
//! into the aggregator as they complete. Phases run strictly in order, and
//! a failed fatal phase stops the run before the next phase is expanded.
//!
//! A profile asking for a single worker still dispatches onto the blocking
//! pool, one batch at a time, so the runtime stays free to deliver stop
//! requests. When no tokio runtime is reachable at all the phase runs on
//! the sequential path on the calling thread.

use std::collections::VecDeque;
use std::sync::Arc;

use labctl_core::{CoreError, CoreResult, OrchestratorContext, PhaseKind, ProgressEvent};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::executor::{run_batch, PhaseHandlers, UnitExecutor};
use crate::models::{Batch, Job, UnitResult};
use crate::outcome::ExecutionOutcome;
use crate::plan::ExecutionPlan;
use crate::run_state::{PhaseVerdict, RunState};
use crate::sequential;

/// A dispatched job and the worker computing its results.
struct ActiveJob {
    job: Job,
    handle: JoinHandle<Vec<UnitResult>>,
}

/// Worker-pool plan executor.
#[derive(Debug, Clone)]
pub struct Scheduler {
    handlers: PhaseHandlers,
}

impl Scheduler {
    pub fn new(handlers: PhaseHandlers) -> Self {
        Self { handlers }
    }

    pub fn handlers(&self) -> &PhaseHandlers {
        &self.handlers
    }

    /// Execute every phase of `plan`.
    ///
    /// Configuration problems are reported before any unit runs. Unit and
    /// worker failures never surface as `Err`; they are failed results in
    /// the returned outcome.
    pub async fn execute(
        &self,
        ctx: &OrchestratorContext,
        plan: &ExecutionPlan,
    ) -> CoreResult<ExecutionOutcome> {
        plan.validate()?;
        self.handlers.ensure_covers(&plan.phases)?;

        tracing::info!(
            run_id = ctx.run_id(),
            scope = %plan.scope,
            profile = %plan.profile_name,
            units = plan.total_units(),
            max_concurrency = plan.config.max_concurrency,
            batch_size = plan.config.batch_size,
            "executing plan"
        );

        let mut state = RunState::new(ctx, plan);
        for &phase in &plan.phases {
            if ctx.stop_requested() {
                state.mark_interrupted(phase);
                break;
            }
            let executor = self.handlers.get(phase).ok_or_else(|| {
                CoreError::invalid_configuration(format!("no executor for phase {}", phase))
            })?;

            let verdict = match worker_pool() {
                Ok(runtime) => {
                    if !plan.config.is_parallel() {
                        state.mark_fallback(
                            phase,
                            format!("max_concurrency is {}", plan.config.max_concurrency),
                        );
                    }
                    self.run_phase(&mut state, &runtime, phase, &executor).await?
                }
                Err(err) => {
                    tracing::warn!(error = %err, "worker pool unavailable");
                    state.mark_fallback(phase, err.to_string());
                    sequential::run_phase(&mut state, phase, executor.as_ref())?
                }
            };

            if verdict == PhaseVerdict::Halt || state.is_interrupted() {
                break;
            }
        }
        Ok(state.into_outcome())
    }

    async fn run_phase(
        &self,
        state: &mut RunState<'_>,
        runtime: &Handle,
        phase: PhaseKind,
        executor: &Arc<dyn UnitExecutor>,
    ) -> CoreResult<PhaseVerdict> {
        let mut batches = state.begin_phase(phase)?;
        let mut attempt = 1;
        loop {
            self.run_batches(state, runtime, phase, executor, batches)
                .await?;
            if state.is_interrupted() {
                break;
            }
            batches = state.retry_batches(phase, attempt)?;
            if batches.is_empty() {
                break;
            }
            attempt += 1;
        }
        Ok(state.finish_phase(phase))
    }

    async fn run_batches(
        &self,
        state: &mut RunState<'_>,
        runtime: &Handle,
        phase: PhaseKind,
        executor: &Arc<dyn UnitExecutor>,
        batches: Vec<Batch>,
    ) -> CoreResult<()> {
        let ctx = state.ctx();
        let config = &state.plan().config;
        let max_active = config.max_concurrency.max(1);
        let poll_interval = config.poll_interval();
        let unit_ctx = state.unit_context();

        let mut pending: VecDeque<Batch> = batches.into();
        let mut active: Vec<ActiveJob> = Vec::with_capacity(max_active);

        loop {
            while active.len() < max_active && !pending.is_empty() {
                if ctx.stop_requested() {
                    state.mark_interrupted(phase);
                    pending.clear();
                    break;
                }
                let Some(batch) = pending.pop_front() else {
                    break;
                };

                let mut job = state.new_job(batch);
                job.start()?;
                let worker_batch = job.batch.clone();
                let worker_executor = Arc::clone(executor);
                let worker_ctx = unit_ctx.clone();
                let handle = runtime.spawn_blocking(move || {
                    run_batch(&worker_batch, worker_executor.as_ref(), &worker_ctx)
                });

                let (job_id, units) = (job.id, job.batch.len());
                active.push(ActiveJob { job, handle });
                state.note_active(active.len());
                ctx.emit(ProgressEvent::BatchDispatched {
                    phase,
                    job_id,
                    units,
                    active_jobs: active.len(),
                });
            }

            if active.is_empty() {
                break;
            }

            let mut drained = 0;
            let mut idx = 0;
            while idx < active.len() {
                if !active[idx].handle.is_finished() {
                    idx += 1;
                    continue;
                }
                let ActiveJob { mut job, handle } = active.remove(idx);
                match handle.await {
                    Ok(results) => job.complete(results)?,
                    Err(e) => {
                        tracing::error!(job_id = job.id, error = %e, "worker failed");
                        job.fail(&e.to_string())?;
                    }
                }
                state.drain(phase, &mut job);
                drained += 1;
            }

            if drained == 0 {
                tokio::time::sleep(poll_interval).await;
            }
        }
        Ok(())
    }
}

/// The runtime whose blocking pool jobs are dispatched onto.
fn worker_pool() -> CoreResult<Handle> {
    Handle::try_current().map_err(|e| CoreError::scheduler_unavailable(e.to_string()))
}
