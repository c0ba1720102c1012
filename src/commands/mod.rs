//! CLI Commands
//!
//! Entry points for the `labctl` subcommands. Each command resolves the
//! workspace, builds what it needs and returns a process exit code.

pub mod cli;
pub mod plan;
pub mod profiles;
pub mod run;

pub use cli::{Cli, LabCommand, Selection};

use std::path::Path;

use labctl_orchestrator::{build_plan, filter_modules, ExecutionPlan, ScopeKind};

use crate::storage::config::ConfigService;
use crate::utils::error::AppResult;

/// Load the workspace and build the plan for a selection, CLI overrides applied.
pub fn prepare_plan(
    workspace: &Path,
    config: Option<&Path>,
    selection: &Selection,
) -> AppResult<(ConfigService, ExecutionPlan)> {
    let service = ConfigService::load(workspace, config)?;
    let scope: ScopeKind = selection.scope.parse()?;
    let catalog = service.profile_catalog()?;
    let modules = filter_modules(service.discover_modules()?, &selection.modules)?;
    let plan = build_plan(scope, modules, &selection.profile, &catalog)?;

    let mut exec_config = plan.config.clone();
    if let Some(batch_size) = selection.batch_size {
        exec_config = exec_config.with_batch_size(batch_size);
    }
    if let Some(max_concurrency) = selection.max_concurrency {
        exec_config = exec_config.with_max_concurrency(max_concurrency);
    }
    if selection.sequential {
        exec_config = exec_config.sequential();
    }
    let plan = plan.with_config(exec_config)?;
    Ok((service, plan))
}
