//! Execution Plan Builder
//!
//! Maps a requested scope to an ordered phase list and expands
//! `phases x modules` into a flat, phase-grouped unit sequence. Phase order
//! is the primary key and module discovery order the secondary key; the
//! fatal Environment rule depends on that ordering.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use labctl_core::{CoreError, CoreResult, PhaseKind};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::models::{ModuleDescriptor, Unit};
use crate::profile::{ExecutionConfig, ProfileCatalog};

/// Requested validation scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    /// Environment, Unit, Integration, Performance
    All,
    /// Every phase including NonInteractive
    Full,
    /// Unit tests only, no environment gate
    Quick,
    Environment,
    Unit,
    Integration,
    Performance,
    NonInteractive,
}

impl ScopeKind {
    pub const ALL_SCOPES: [ScopeKind; 8] = [
        ScopeKind::All,
        ScopeKind::Full,
        ScopeKind::Quick,
        ScopeKind::Environment,
        ScopeKind::Unit,
        ScopeKind::Integration,
        ScopeKind::Performance,
        ScopeKind::NonInteractive,
    ];

    /// Ordered phases this scope runs.
    pub fn phases(&self) -> &'static [PhaseKind] {
        match self {
            ScopeKind::All => &[
                PhaseKind::Environment,
                PhaseKind::Unit,
                PhaseKind::Integration,
                PhaseKind::Performance,
            ],
            ScopeKind::Full => &PhaseKind::ALL,
            ScopeKind::Quick => &[PhaseKind::Unit],
            ScopeKind::Environment => &[PhaseKind::Environment],
            ScopeKind::Unit => &[PhaseKind::Environment, PhaseKind::Unit],
            ScopeKind::Integration => &[PhaseKind::Environment, PhaseKind::Integration],
            ScopeKind::Performance => &[PhaseKind::Environment, PhaseKind::Performance],
            ScopeKind::NonInteractive => &[PhaseKind::Environment, PhaseKind::NonInteractive],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::All => "all",
            ScopeKind::Full => "full",
            ScopeKind::Quick => "quick",
            ScopeKind::Environment => "environment",
            ScopeKind::Unit => "unit",
            ScopeKind::Integration => "integration",
            ScopeKind::Performance => "performance",
            ScopeKind::NonInteractive => "non_interactive",
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScopeKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace('-', "_");
        ScopeKind::ALL_SCOPES
            .into_iter()
            .find(|scope| scope.as_str() == key || scope.as_str().replace('_', "") == key)
            .ok_or_else(|| {
                CoreError::invalid_configuration(format!("unknown scope '{}'", s))
            })
    }
}

/// The ordered `phases x modules` expansion for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPlan {
    pub scope: ScopeKind,
    pub profile_name: String,
    pub phases: Vec<PhaseKind>,
    pub modules: Vec<ModuleDescriptor>,
    pub config: ExecutionConfig,
    pub start_time: DateTime<Utc>,
}

impl ExecutionPlan {
    /// Replace the execution config (CLI overrides). Re-validated.
    pub fn with_config(mut self, config: ExecutionConfig) -> CoreResult<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Check that the plan can run at all.
    pub fn validate(&self) -> CoreResult<()> {
        self.config.validate()?;
        let mut seen = HashSet::new();
        for module in &self.modules {
            if !seen.insert(module.name.as_str()) {
                return Err(CoreError::invalid_configuration(format!(
                    "duplicate module '{}'",
                    module.name
                )));
            }
        }
        Ok(())
    }

    /// Total unit count across all phases.
    pub fn total_units(&self) -> usize {
        self.phases.len() * self.modules.len()
    }

    /// Units of one phase, in module discovery order.
    ///
    /// Ordinals are positions in the flat phase-major sequence.
    pub fn units_for(&self, phase: PhaseKind) -> Vec<Unit> {
        let Some(phase_index) = self.phases.iter().position(|p| *p == phase) else {
            return Vec::new();
        };
        let base = phase_index * self.modules.len();
        self.modules
            .iter()
            .enumerate()
            .map(|(i, module)| {
                Unit::new(
                    module.name.clone(),
                    phase,
                    base + i,
                    json!({
                        "module": module.name,
                        "path": module.path.to_string_lossy(),
                    }),
                )
            })
            .collect()
    }

    /// Every unit of the plan, phase-major.
    pub fn units(&self) -> Vec<Unit> {
        self.phases
            .iter()
            .flat_map(|phase| self.units_for(*phase))
            .collect()
    }
}

/// Build a plan for `scope` over `modules` using the named profile.
pub fn build_plan(
    scope: ScopeKind,
    modules: Vec<ModuleDescriptor>,
    profile_name: &str,
    catalog: &ProfileCatalog,
) -> CoreResult<ExecutionPlan> {
    let config = catalog.resolve(profile_name)?;
    let plan = ExecutionPlan {
        scope,
        profile_name: profile_name.to_ascii_lowercase(),
        phases: scope.phases().to_vec(),
        modules,
        config,
        start_time: Utc::now(),
    };
    plan.validate()?;

    tracing::debug!(
        scope = %scope,
        profile = %plan.profile_name,
        phases = plan.phases.len(),
        modules = plan.modules.len(),
        units = plan.total_units(),
        "built execution plan"
    );
    Ok(plan)
}

/// Keep only the modules named in `allow`, in discovery order.
///
/// An empty allow-list keeps everything. Names not present in `modules`
/// are a configuration error.
pub fn filter_modules(
    modules: Vec<ModuleDescriptor>,
    allow: &[String],
) -> CoreResult<Vec<ModuleDescriptor>> {
    if allow.is_empty() {
        return Ok(modules);
    }
    let known: HashSet<&str> = modules.iter().map(|m| m.name.as_str()).collect();
    let missing: Vec<&str> = allow
        .iter()
        .map(String::as_str)
        .filter(|name| !known.contains(name))
        .collect();
    if !missing.is_empty() {
        return Err(CoreError::invalid_configuration(format!(
            "unknown module(s): {}",
            missing.join(", ")
        )));
    }
    Ok(modules
        .into_iter()
        .filter(|m| allow.iter().any(|a| a == &m.name))
        .collect())
}
