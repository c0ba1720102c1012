//! Orchestrator Integration Tests
//!
//! Drives the scheduler and sequential executor with deterministic stub
//! executors and checks the run-level guarantees: batching, the concurrency
//! bound, result conservation, fatal Environment halting and parity between
//! the pooled and sequential paths.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use labctl_core::{CoreError, OrchestratorContext, PhaseKind, ProgressEvent};
use labctl_orchestrator::{
    build_plan, ExecutionConfig, ExecutionPlan, ModuleDescriptor, PhaseHandlers, ProfileCatalog,
    RunStatus, Scheduler, ScopeKind, SequentialExecutor, Unit, UnitContext, UnitOutcome,
    UnitResult,
};

// ============================================================================
// Helper Functions
// ============================================================================

fn modules(count: usize) -> Vec<ModuleDescriptor> {
    (0..count)
        .map(|i| ModuleDescriptor::new(format!("Module{:02}", i), format!("/ws/modules/{}", i)))
        .collect()
}

fn plan(scope: ScopeKind, module_count: usize, batch_size: usize, max_concurrency: usize) -> ExecutionPlan {
    let catalog = ProfileCatalog::builtin().unwrap();
    let plan = build_plan(scope, modules(module_count), "development", &catalog).unwrap();
    let config = ExecutionConfig {
        poll_interval_ms: 5,
        ..plan.config.clone()
    }
    .with_batch_size(batch_size)
    .with_max_concurrency(max_concurrency);
    plan.with_config(config).unwrap()
}

fn handlers<F>(f: F) -> PhaseHandlers
where
    F: Fn(&Unit, &UnitContext) -> UnitOutcome + Send + Sync + 'static,
{
    PhaseHandlers::new().with_fallback(Arc::new(f))
}

fn recording_context() -> (OrchestratorContext, Arc<Mutex<Vec<ProgressEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let ctx = OrchestratorContext::new("/ws", "development").with_observer(Arc::new(
        move |event: &ProgressEvent| sink.lock().unwrap().push(event.clone()),
    ));
    (ctx, events)
}

fn without_timing(results: &[UnitResult]) -> Vec<UnitResult> {
    results
        .iter()
        .cloned()
        .map(|mut r| {
            r.duration_seconds = 0.0;
            r
        })
        .collect()
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_quick_scope_twenty_three_units() {
    let (ctx, events) = recording_context();
    let scheduler = Scheduler::new(handlers(|_, _| UnitOutcome::passed()));
    let outcome = scheduler
        .execute(&ctx, &plan(ScopeKind::Quick, 23, 10, 4))
        .await
        .unwrap();

    let sizes: Vec<usize> = events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::BatchDispatched { units, .. } => Some(*units),
            _ => None,
        })
        .collect();
    assert_eq!(sizes, vec![10, 10, 3]);

    assert_eq!(outcome.status, RunStatus::Passed);
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(outcome.report.total_units, 23);
    assert_eq!(outcome.report.total_failed, 0);
    assert_eq!(outcome.report.success_rate, 100.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_environment_failure_halts_all_scope() {
    let executed_later = Arc::new(AtomicUsize::new(0));
    let later = Arc::clone(&executed_later);
    let scheduler = Scheduler::new(handlers(move |unit, _| match unit.phase {
        PhaseKind::Environment if unit.module_name == "Module03" => {
            UnitOutcome::failed("required toolchain missing")
        }
        PhaseKind::Environment => UnitOutcome::passed(),
        _ => {
            later.fetch_add(1, Ordering::SeqCst);
            UnitOutcome::passed()
        }
    }));
    let (ctx, events) = recording_context();
    let outcome = scheduler
        .execute(&ctx, &plan(ScopeKind::All, 5, 2, 3))
        .await
        .unwrap();

    assert_eq!(executed_later.load(Ordering::SeqCst), 0);
    assert_eq!(outcome.status, RunStatus::Halted);
    assert_ne!(outcome.exit_code(), 0);
    assert_ne!(outcome.exit_code(), RunStatus::CompletedWithFailures.exit_code());
    assert_eq!(outcome.report.total_units, 5);
    assert_eq!(outcome.report.failed_units, 1);
    assert!(outcome.halted_by.is_some());
    assert!(events
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, ProgressEvent::FatalHalt { failed_units: 1, .. })));

    let err = outcome.into_result().unwrap_err();
    assert!(matches!(err, CoreError::FatalPhase { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_non_fatal_failures_do_not_stop_the_plan() {
    let scheduler = Scheduler::new(handlers(|unit, _| {
        if unit.phase == PhaseKind::Integration && unit.module_name == "Module01" {
            UnitOutcome::from_counts(4, 3, 1).with_error("1 assertion failed")
        } else {
            UnitOutcome::from_counts(4, 4, 0)
        }
    }));
    let (ctx, _) = recording_context();
    let outcome = scheduler
        .execute(&ctx, &plan(ScopeKind::All, 3, 2, 2))
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::CompletedWithFailures);
    assert_eq!(outcome.exit_code(), 1);
    assert_eq!(outcome.phases_run.len(), 4);
    assert_eq!(outcome.report.total_units, 12);
    assert_eq!(outcome.report.total_tests_run, 48);
    assert_eq!(outcome.report.total_failed, 1);
    assert_eq!(outcome.report.success_rate, 97.92);
}

#[tokio::test]
async fn test_zero_batch_size_is_rejected_before_execution() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let scheduler = Scheduler::new(handlers(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        UnitOutcome::passed()
    }));

    let mut bad = plan(ScopeKind::Quick, 4, 2, 2);
    bad.config.batch_size = 0;
    let (ctx, _) = recording_context();
    let err = scheduler.execute(&ctx, &bad).await.unwrap_err();

    assert!(matches!(err, CoreError::InvalidConfiguration(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Invariants
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrency_bound_and_result_conservation() {
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let tests_reported = Arc::new(AtomicU64::new(0));
    let (r, p, t) = (
        Arc::clone(&running),
        Arc::clone(&peak),
        Arc::clone(&tests_reported),
    );

    let scheduler = Scheduler::new(handlers(move |unit, _| {
        let now = r.fetch_add(1, Ordering::SeqCst) + 1;
        p.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(5));
        r.fetch_sub(1, Ordering::SeqCst);

        let run = (unit.ordinal % 5) as u64 + 1;
        let failed = u64::from(unit.ordinal % 7 == 0 && unit.phase != PhaseKind::Environment);
        t.fetch_add(run, Ordering::SeqCst);
        UnitOutcome::from_counts(run, run - failed, failed)
    }));

    let (ctx, _) = recording_context();
    let outcome = scheduler
        .execute(&ctx, &plan(ScopeKind::Full, 17, 3, 3))
        .await
        .unwrap();

    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert!(outcome.peak_active_jobs <= 3);
    assert_eq!(outcome.report.total_units, 17 * 5);
    assert_eq!(outcome.results.len(), 17 * 5);
    assert_eq!(
        outcome.report.total_tests_run,
        tests_reported.load(Ordering::SeqCst)
    );
    assert_eq!(
        outcome.report.total_passed + outcome.report.total_failed,
        outcome.report.total_tests_run
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_scheduler_and_sequential_agree() {
    let stub = |unit: &Unit, _: &UnitContext| {
        if unit.module_name.ends_with('4') && unit.phase == PhaseKind::Performance {
            UnitOutcome::failed("regression over budget")
        } else {
            UnitOutcome::from_counts(2, 2, 0)
        }
    };
    let pooled_plan = plan(ScopeKind::All, 9, 2, 4);
    let sequential_plan = pooled_plan
        .clone()
        .with_config(pooled_plan.config.clone().sequential())
        .unwrap();

    let (ctx_a, _) = recording_context();
    let pooled = Scheduler::new(handlers(stub))
        .execute(&ctx_a, &pooled_plan)
        .await
        .unwrap();
    let (ctx_b, _) = recording_context();
    let sequential = SequentialExecutor::new(handlers(stub))
        .execute(&ctx_b, &sequential_plan)
        .unwrap();

    assert_eq!(pooled.status, sequential.status);
    assert_eq!(without_timing(&pooled.results), without_timing(&sequential.results));

    let mut a = pooled.report.clone();
    let mut b = sequential.report.clone();
    for report in [&mut a, &mut b] {
        report.total_duration_seconds = 0.0;
        for phase in &mut report.per_phase {
            phase.duration_seconds = 0.0;
        }
        for results in report.per_module.values_mut() {
            for r in results.iter_mut() {
                r.duration_seconds = 0.0;
            }
        }
    }
    assert_eq!(a, b);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_environment_retry_avoids_halt() {
    let scheduler = Scheduler::new(handlers(|unit, _| {
        if unit.phase == PhaseKind::Environment && unit.module_name == "Module00" && unit.attempt == 1 {
            UnitOutcome::failed("transient network error")
        } else {
            UnitOutcome::passed()
        }
    }));
    let base = plan(ScopeKind::Unit, 3, 2, 2);
    let mut config = base.config.clone();
    config.retry_count = 1;
    let retry_plan = base.with_config(config).unwrap();

    let (ctx, _) = recording_context();
    let outcome = scheduler.execute(&ctx, &retry_plan).await.unwrap();

    assert_eq!(outcome.status, RunStatus::Passed);
    assert_eq!(outcome.report.total_units, 6);
    assert_eq!(outcome.report.superseded_attempts, 1);
    assert_eq!(outcome.report.per_module["Module00"][0].attempt, 2);
}
