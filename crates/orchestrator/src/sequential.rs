//! Sequential Executor
//!
//! Runs a plan one batch at a time on the calling thread. Used directly when
//! parallelism is disabled, and by the scheduler for any phase where the
//! worker pool cannot be used. Produces the same results, ordering and
//! fatal-phase behaviour as the pooled path.

use labctl_core::{CoreError, CoreResult, OrchestratorContext, PhaseKind, ProgressEvent};

use crate::executor::{run_batch, PhaseHandlers, UnitExecutor};
use crate::models::Batch;
use crate::outcome::ExecutionOutcome;
use crate::plan::ExecutionPlan;
use crate::run_state::{PhaseVerdict, RunState};

/// Single-threaded plan executor.
#[derive(Debug, Clone)]
pub struct SequentialExecutor {
    handlers: PhaseHandlers,
}

impl SequentialExecutor {
    pub fn new(handlers: PhaseHandlers) -> Self {
        Self { handlers }
    }

    /// Execute every phase of `plan` in order.
    pub fn execute(
        &self,
        ctx: &OrchestratorContext,
        plan: &ExecutionPlan,
    ) -> CoreResult<ExecutionOutcome> {
        plan.validate()?;
        self.handlers.ensure_covers(&plan.phases)?;

        tracing::info!(
            run_id = ctx.run_id(),
            scope = %plan.scope,
            units = plan.total_units(),
            "executing plan sequentially"
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
            if run_phase(&mut state, phase, executor.as_ref())? == PhaseVerdict::Halt {
                break;
            }
            if state.is_interrupted() {
                break;
            }
        }
        Ok(state.into_outcome())
    }
}

/// Run one phase, including retry rounds, on the current thread.
pub(crate) fn run_phase(
    state: &mut RunState<'_>,
    phase: PhaseKind,
    executor: &dyn UnitExecutor,
) -> CoreResult<PhaseVerdict> {
    let mut batches = state.begin_phase(phase)?;
    let mut attempt = 1;
    loop {
        run_batches(state, phase, executor, batches)?;
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

fn run_batches(
    state: &mut RunState<'_>,
    phase: PhaseKind,
    executor: &dyn UnitExecutor,
    batches: Vec<Batch>,
) -> CoreResult<()> {
    let unit_ctx = state.unit_context();
    for batch in batches {
        if state.ctx().stop_requested() {
            state.mark_interrupted(phase);
            break;
        }
        let mut job = state.new_job(batch);
        job.start()?;
        state.note_active(1);
        state.ctx().emit(ProgressEvent::BatchDispatched {
            phase,
            job_id: job.id,
            units: job.batch.len(),
            active_jobs: 1,
        });

        let results = run_batch(&job.batch, executor, &unit_ctx);
        job.complete(results)?;
        state.drain(phase, &mut job);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModuleDescriptor, Unit, UnitOutcome};
    use crate::outcome::RunStatus;
    use crate::plan::ScopeKind;
    use crate::profile::{ExecutionConfig, Verbosity};
    use crate::executor::UnitContext;
    use chrono::Utc;
    use std::sync::Arc;

    fn plan(scope: ScopeKind, modules: usize, retry_count: u32) -> ExecutionPlan {
        ExecutionPlan {
            scope,
            profile_name: "test".into(),
            phases: scope.phases().to_vec(),
            modules: (0..modules)
                .map(|i| ModuleDescriptor::new(format!("M{:02}", i), format!("/m/{}", i)))
                .collect(),
            config: ExecutionConfig {
                max_concurrency: 1,
                batch_size: 3,
                timeout_per_unit_secs: 60,
                verbosity: Verbosity::Normal,
                retry_count,
                poll_interval_ms: 5,
            },
            start_time: Utc::now(),
        }
    }

    fn handlers<F>(f: F) -> PhaseHandlers
    where
        F: Fn(&Unit, &UnitContext) -> UnitOutcome + Send + Sync + 'static,
    {
        PhaseHandlers::new().with_fallback(Arc::new(f))
    }

    #[test]
    fn test_sequential_runs_every_unit_in_order() {
        let ctx = OrchestratorContext::new("/tmp/ws", "test");
        let exec = SequentialExecutor::new(handlers(|_, _| UnitOutcome::passed()));
        let outcome = exec.execute(&ctx, &plan(ScopeKind::Unit, 4, 0)).unwrap();

        assert_eq!(outcome.status, RunStatus::Passed);
        assert_eq!(outcome.report.total_units, 8);
        let ordinals: Vec<usize> = outcome.results.iter().map(|r| r.ordinal).collect();
        assert_eq!(ordinals, (0..8).collect::<Vec<_>>());
        assert_eq!(outcome.peak_active_jobs, 1);
        assert!(!outcome.used_fallback);
    }

    #[test]
    fn test_environment_failure_halts() {
        let ctx = OrchestratorContext::new("/tmp/ws", "test");
        let exec = SequentialExecutor::new(handlers(|unit, _| {
            if unit.phase == PhaseKind::Environment && unit.module_name == "M01" {
                UnitOutcome::failed("lint failed")
            } else {
                UnitOutcome::passed()
            }
        }));
        let outcome = exec.execute(&ctx, &plan(ScopeKind::All, 3, 0)).unwrap();

        assert_eq!(outcome.status, RunStatus::Halted);
        assert_eq!(outcome.report.total_units, 3);
        assert_eq!(outcome.phases_run, vec![PhaseKind::Environment]);
        assert_eq!(outcome.skipped_phases.len(), 3);
    }

    #[test]
    fn test_retry_supersedes_failed_attempt() {
        let ctx = OrchestratorContext::new("/tmp/ws", "test");
        let exec = SequentialExecutor::new(handlers(|unit, _| {
            if unit.module_name == "M00" && unit.attempt == 1 {
                UnitOutcome::failed("flaky")
            } else {
                UnitOutcome::passed()
            }
        }));
        let outcome = exec.execute(&ctx, &plan(ScopeKind::Quick, 2, 1)).unwrap();

        assert_eq!(outcome.status, RunStatus::Passed);
        assert_eq!(outcome.report.total_units, 2);
        assert_eq!(outcome.report.superseded_attempts, 1);
        assert_eq!(outcome.results[0].attempt, 2);
    }

    #[test]
    fn test_stop_before_start_runs_nothing() {
        let ctx = OrchestratorContext::new("/tmp/ws", "test");
        ctx.request_stop();
        let exec = SequentialExecutor::new(handlers(|_, _| panic!("must not run")));
        let outcome = exec.execute(&ctx, &plan(ScopeKind::All, 2, 0)).unwrap();

        assert_eq!(outcome.status, RunStatus::Interrupted);
        assert!(outcome.results.is_empty());
    }

    #[test]
    fn test_missing_handler_rejected_before_running() {
        let ctx = OrchestratorContext::new("/tmp/ws", "test");
        let exec = SequentialExecutor::new(PhaseHandlers::new());
        let err = exec.execute(&ctx, &plan(ScopeKind::Quick, 1, 0)).unwrap_err();
        assert!(err.is_configuration());
    }
}
