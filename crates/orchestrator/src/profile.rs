//! Execution Profiles
//!
//! Profiles are data: a TOML table per profile, merged field-by-field over
//! the built-in set. Resolving a profile yields the `ExecutionConfig` the
//! scheduler runs with.

use std::collections::BTreeMap;
use std::time::Duration;

use labctl_core::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

const BUILTIN_PROFILES: &str = include_str!("../profiles/builtin.toml");

const DEFAULT_BATCH_SIZE: usize = 10;
const DEFAULT_TIMEOUT_SECS: u64 = 300;
const DEFAULT_CONCURRENCY_CEILING: usize = 8;
const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Output detail level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Minimal,
    #[default]
    Normal,
    Detailed,
    Diagnostic,
}

impl Verbosity {
    /// Default `tracing` level directive for this verbosity.
    pub fn as_filter(&self) -> &'static str {
        match self {
            Verbosity::Minimal => "warn",
            Verbosity::Normal => "info",
            Verbosity::Detailed => "debug",
            Verbosity::Diagnostic => "trace",
        }
    }
}

impl std::fmt::Display for Verbosity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verbosity::Minimal => write!(f, "minimal"),
            Verbosity::Normal => write!(f, "normal"),
            Verbosity::Detailed => write!(f, "detailed"),
            Verbosity::Diagnostic => write!(f, "diagnostic"),
        }
    }
}

/// Resolved execution settings for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionConfig {
    /// Maximum number of concurrently running jobs
    pub max_concurrency: usize,
    /// Maximum units per batch
    pub batch_size: usize,
    /// Advisory per-unit timeout, enforced by executors
    pub timeout_per_unit_secs: u64,
    /// Output detail level
    pub verbosity: Verbosity,
    /// Extra attempts for failed units
    pub retry_count: u32,
    /// How often the driving loop checks for finished jobs
    pub poll_interval_ms: u64,
}

impl ExecutionConfig {
    pub fn timeout_per_unit(&self) -> Duration {
        Duration::from_secs(self.timeout_per_unit_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Whether the worker pool will be used at all.
    pub fn is_parallel(&self) -> bool {
        self.max_concurrency > 1
    }

    /// Override the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Override the concurrency limit.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Force single-worker execution.
    pub fn sequential(mut self) -> Self {
        self.max_concurrency = 1;
        self
    }

    /// Reject settings the scheduler cannot run with.
    pub fn validate(&self) -> CoreResult<()> {
        if self.batch_size == 0 {
            return Err(CoreError::invalid_configuration(
                "batch_size must be greater than 0",
            ));
        }
        if self.max_concurrency == 0 {
            return Err(CoreError::invalid_configuration(
                "max_concurrency must be greater than 0",
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(CoreError::invalid_configuration(
                "poll_interval_ms must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ProfileSpec::default().resolve(host_parallelism())
    }
}

/// One profile as written in TOML. Unset fields fall back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency_ceiling: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_per_unit_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbosity: Option<Verbosity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,
}

impl ProfileSpec {
    /// Field-level merge: values set in `over` win.
    pub fn merged_with(&self, over: &ProfileSpec) -> ProfileSpec {
        ProfileSpec {
            description: over.description.clone().or_else(|| self.description.clone()),
            max_concurrency: over.max_concurrency.or(self.max_concurrency),
            concurrency_ceiling: over.concurrency_ceiling.or(self.concurrency_ceiling),
            batch_size: over.batch_size.or(self.batch_size),
            timeout_per_unit_secs: over.timeout_per_unit_secs.or(self.timeout_per_unit_secs),
            verbosity: over.verbosity.or(self.verbosity),
            retry_count: over.retry_count.or(self.retry_count),
            poll_interval_ms: over.poll_interval_ms.or(self.poll_interval_ms),
        }
    }

    /// Turn the spec into concrete settings.
    ///
    /// Without an explicit `max_concurrency`, the host's parallelism is used,
    /// capped at `concurrency_ceiling`.
    pub fn resolve(&self, host_parallelism: usize) -> ExecutionConfig {
        let ceiling = self
            .concurrency_ceiling
            .unwrap_or(DEFAULT_CONCURRENCY_CEILING)
            .max(1);
        let max_concurrency = self
            .max_concurrency
            .unwrap_or_else(|| host_parallelism.clamp(1, ceiling));

        ExecutionConfig {
            max_concurrency,
            batch_size: self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            timeout_per_unit_secs: self.timeout_per_unit_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            verbosity: self.verbosity.unwrap_or_default(),
            retry_count: self.retry_count.unwrap_or(0),
            poll_interval_ms: self.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

/// Named profiles, keyed by lowercase name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileCatalog {
    profiles: BTreeMap<String, ProfileSpec>,
}

impl ProfileCatalog {
    /// The built-in profiles (development, ci, production, debug).
    pub fn builtin() -> CoreResult<Self> {
        Self::from_toml_str(BUILTIN_PROFILES)
    }

    /// Parse a TOML document whose top-level tables are profiles.
    pub fn from_toml_str(content: &str) -> CoreResult<Self> {
        let profiles: BTreeMap<String, ProfileSpec> = toml::from_str(content)
            .map_err(|e| CoreError::parse(format!("Failed to parse profiles: {}", e)))?;
        Ok(Self::from_specs(profiles))
    }

    /// Build a catalog from already-parsed specs.
    pub fn from_specs(profiles: BTreeMap<String, ProfileSpec>) -> Self {
        Self {
            profiles: profiles
                .into_iter()
                .map(|(name, spec)| (name.to_ascii_lowercase(), spec))
                .collect(),
        }
    }

    /// Merge overrides into this catalog. Unknown names become new profiles.
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, ProfileSpec>) -> Self {
        for (name, over) in overrides {
            let key = name.to_ascii_lowercase();
            let merged = match self.profiles.get(&key) {
                Some(base) => base.merged_with(over),
                None => over.clone(),
            };
            self.profiles.insert(key, merged);
        }
        self
    }

    /// Look up a profile spec by name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&ProfileSpec> {
        self.profiles.get(&name.to_ascii_lowercase())
    }

    /// Profile names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.profiles.keys().map(String::as_str).collect()
    }

    /// Resolve a profile against this host.
    pub fn resolve(&self, name: &str) -> CoreResult<ExecutionConfig> {
        self.resolve_with_parallelism(name, host_parallelism())
    }

    /// Resolve a profile for a given host parallelism.
    pub fn resolve_with_parallelism(
        &self,
        name: &str,
        host_parallelism: usize,
    ) -> CoreResult<ExecutionConfig> {
        let spec = self.get(name).ok_or_else(|| {
            CoreError::invalid_configuration(format!(
                "unknown profile '{}' (available: {})",
                name,
                self.names().join(", ")
            ))
        })?;
        let config = spec.resolve(host_parallelism);
        config.validate()?;
        Ok(config)
    }
}

/// Number of cores available to this process, or 1 if unknown.
pub fn host_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
