//! `labctl run`

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use labctl_core::OrchestratorContext;
use labctl_orchestrator::{ExecutionOutcome, Scheduler};

use crate::bootstrap::init_tracing;
use crate::commands::{prepare_plan, Selection};
use crate::services::executors::build_handlers;
use crate::services::progress::ConsoleProgress;
use crate::services::reporter::{FileReporter, ReportArtifacts, Reporter};
use crate::utils::error::AppResult;

/// Options for one `run` invocation.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub workspace: PathBuf,
    pub config: Option<PathBuf>,
    pub selection: Selection,
    pub output_dir: Option<PathBuf>,
    pub log_override: Option<&'static str>,
    pub quiet: bool,
}

/// Execute a run end to end and return the process exit code.
pub async fn execute(options: RunOptions) -> AppResult<i32> {
    let (service, plan) = prepare_plan(
        &options.workspace,
        options.config.as_deref(),
        &options.selection,
    )?;
    init_tracing(options.log_override.unwrap_or(plan.config.verbosity.as_filter()));

    let handlers = build_handlers(service.config(), service.root())?;
    handlers.ensure_covers(&plan.phases)?;

    let ctx = OrchestratorContext::new(service.root(), plan.profile_name.clone())
        .with_output_dir(service.output_dir(options.output_dir.as_deref()))
        .with_observer(Arc::new(ConsoleProgress::new(options.quiet)));

    let stop = ctx.stop_handle();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, finishing running batches");
            stop.store(true, Ordering::SeqCst);
        }
    });

    let result = Scheduler::new(handlers).execute(&ctx, &plan).await;
    signal_task.abort();
    let outcome = result?;

    let artifacts = FileReporter::new().report(&ctx, &outcome)?;
    print_summary(&outcome, &artifacts, service.root());
    Ok(outcome.exit_code())
}

fn print_summary(outcome: &ExecutionOutcome, artifacts: &ReportArtifacts, root: &Path) {
    let report = &outcome.report;
    println!(
        "{}: {} units ({} failed), {} tests ({} passed, {} failed), success rate {:.2}%",
        outcome.status,
        report.total_units,
        report.failed_units,
        report.total_tests_run,
        report.total_passed,
        report.total_failed,
        report.success_rate
    );
    if let Some(fatal) = &outcome.halted_by {
        println!(
            "halted after {} phase: {}",
            fatal.phase,
            fatal.failed_units.join(", ")
        );
    }
    for path in artifacts.paths() {
        let shown = path.strip_prefix(root).unwrap_or(path);
        println!("  report: {}", shown.display());
    }
}
