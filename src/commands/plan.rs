//! `labctl plan`: dry run that prints the expanded plan.

use std::fmt::Write as _;
use std::path::Path;

use labctl_orchestrator::ExecutionPlan;

use crate::commands::{prepare_plan, Selection};
use crate::services::executors::uncovered_phases;
use crate::storage::config::WorkspaceConfig;
use crate::utils::error::AppResult;

pub fn execute(workspace: &Path, config: Option<&Path>, selection: &Selection) -> AppResult<i32> {
    let (service, plan) = prepare_plan(workspace, config, selection)?;
    print!("{}", render(&plan, service.config()));
    Ok(0)
}

/// Text description of a plan.
pub fn render(plan: &ExecutionPlan, config: &WorkspaceConfig) -> String {
    let batch_size = plan.config.batch_size;
    let batches = plan.modules.len().div_ceil(batch_size);

    let mut out = String::new();
    let _ = writeln!(out, "scope:    {}", plan.scope);
    let _ = writeln!(out, "profile:  {}", plan.profile_name);
    let _ = writeln!(
        out,
        "config:   max_concurrency={} batch_size={} timeout={}s retries={} verbosity={}",
        plan.config.max_concurrency,
        batch_size,
        plan.config.timeout_per_unit_secs,
        plan.config.retry_count,
        plan.config.verbosity
    );
    let _ = writeln!(out, "units:    {}", plan.total_units());

    let _ = writeln!(out, "phases:");
    for phase in &plan.phases {
        let _ = writeln!(
            out,
            "  {:<16} {} units, {} batches{}",
            phase.as_str(),
            plan.modules.len(),
            batches,
            if phase.is_fatal() { " (fatal)" } else { "" }
        );
    }

    let _ = writeln!(out, "modules:");
    for module in &plan.modules {
        let _ = writeln!(out, "  {:<16} {}", module.name, module.path.display());
    }

    let missing = uncovered_phases(config, &plan.phases);
    if !missing.is_empty() {
        let names: Vec<&str> = missing.iter().map(|p| p.as_str()).collect();
        let _ = writeln!(out, "warning: no executor configured for: {}", names.join(", "));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use labctl_orchestrator::{build_plan, ModuleDescriptor, ProfileCatalog, ScopeKind};

    #[test]
    fn test_render_counts_batches() {
        let modules = (0..12)
            .map(|i| ModuleDescriptor::new(format!("M{}", i), format!("/m/{}", i)))
            .collect();
        let catalog = ProfileCatalog::builtin().unwrap();
        let plan = build_plan(ScopeKind::Unit, modules, "ci", &catalog).unwrap();

        let text = render(&plan, &WorkspaceConfig::default());
        assert!(text.contains("units:    24"));
        assert!(text.contains("environment      12 units, 2 batches (fatal)"));
        assert!(text.contains("warning: no executor configured for: environment, unit"));
    }
}
