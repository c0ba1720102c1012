//! Phase Tags
//!
//! Closed set of validation phases. Ordering within a plan is decided by the
//! plan builder, not by the declaration order here.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A named stage of validation with its own pass/fail semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    /// Environment validation (static analysis, prerequisites). Fatal on failure.
    Environment,
    /// Unit tests
    Unit,
    /// Integration tests
    Integration,
    /// Performance tests
    Performance,
    /// Non-interactive execution checks
    NonInteractive,
}

impl PhaseKind {
    /// Every phase, in declaration order.
    pub const ALL: [PhaseKind; 5] = [
        PhaseKind::Environment,
        PhaseKind::Unit,
        PhaseKind::Integration,
        PhaseKind::Performance,
        PhaseKind::NonInteractive,
    ];

    /// Whether a failed unit in this phase halts the remaining phases.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PhaseKind::Environment)
    }

    /// Stable snake_case key used in configuration files and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseKind::Environment => "environment",
            PhaseKind::Unit => "unit",
            PhaseKind::Integration => "integration",
            PhaseKind::Performance => "performance",
            PhaseKind::NonInteractive => "non_interactive",
        }
    }

    /// Human-readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            PhaseKind::Environment => "Environment",
            PhaseKind::Unit => "Unit",
            PhaseKind::Integration => "Integration",
            PhaseKind::Performance => "Performance",
            PhaseKind::NonInteractive => "NonInteractive",
        }
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PhaseKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace('-', "_");
        match key.as_str() {
            "environment" | "env" => Ok(PhaseKind::Environment),
            "unit" => Ok(PhaseKind::Unit),
            "integration" => Ok(PhaseKind::Integration),
            "performance" | "perf" => Ok(PhaseKind::Performance),
            "non_interactive" | "noninteractive" => Ok(PhaseKind::NonInteractive),
            _ => Err(CoreError::invalid_configuration(format!(
                "unknown phase '{}'",
                s
            ))),
        }
    }
}
