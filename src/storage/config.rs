//! Workspace Configuration
//!
//! Loads `labctl.toml`: report location, module discovery, profile
//! overrides and per-phase command executors. A workspace without a config
//! file runs with defaults.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use labctl_core::PhaseKind;
use labctl_orchestrator::{ModuleDescriptor, ProfileCatalog, ProfileSpec};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::{config_path, resolve_against, DEFAULT_OUTPUT_DIR};

/// Key under `[executors]` for the handler used by phases without their own.
pub const DEFAULT_EXECUTOR_KEY: &str = "default";

/// Directory scanned for modules when `modules_root` is not set.
pub const DEFAULT_MODULES_ROOT: &str = "modules";

/// A module declared explicitly in `[[modules]]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleEntry {
    pub name: String,
    pub path: PathBuf,
}

/// A command run once per unit of a phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutorSpec {
    /// Program to run, resolved through PATH
    pub program: String,
    /// Arguments; `{module}`, `{path}`, `{phase}`, `{unit}` and `{attempt}` are substituted
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Working directory; defaults to the module path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    /// Regex with `passed` and `failed` named groups, matched against output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_pattern: Option<String>,
}

/// Contents of `labctl.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkspaceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modules_root: Option<PathBuf>,
    #[serde(default)]
    pub modules: Vec<ModuleEntry>,
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileSpec>,
    #[serde(default)]
    pub executors: BTreeMap<String, ExecutorSpec>,
}

impl WorkspaceConfig {
    /// Parse and validate a TOML document.
    pub fn parse(content: &str) -> AppResult<Self> {
        let config: WorkspaceConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check everything that can be checked without touching the file system.
    pub fn validate(&self) -> AppResult<()> {
        let mut names = HashSet::new();
        for module in &self.modules {
            if module.name.trim().is_empty() {
                return Err(AppError::config("module name must not be empty"));
            }
            if !names.insert(module.name.as_str()) {
                return Err(AppError::config(format!(
                    "module '{}' declared more than once",
                    module.name
                )));
            }
        }

        for (key, spec) in &self.executors {
            if key != DEFAULT_EXECUTOR_KEY {
                key.parse::<PhaseKind>()?;
            }
            if spec.program.trim().is_empty() {
                return Err(AppError::config(format!(
                    "executor '{}' has an empty program",
                    key
                )));
            }
            if let Some(pattern) = &spec.summary_pattern {
                compile_summary_pattern(pattern)
                    .map_err(|e| AppError::config(format!("executor '{}': {}", key, e)))?;
            }
        }
        Ok(())
    }

    /// Executors keyed by phase, plus the default one if declared.
    pub fn phase_executors(&self) -> AppResult<(Vec<(PhaseKind, &ExecutorSpec)>, Option<&ExecutorSpec>)> {
        let mut by_phase = Vec::new();
        let mut default = None;
        for (key, spec) in &self.executors {
            if key == DEFAULT_EXECUTOR_KEY {
                default = Some(spec);
            } else {
                by_phase.push((key.parse::<PhaseKind>()?, spec));
            }
        }
        Ok((by_phase, default))
    }
}

/// Compile a summary pattern, requiring the `passed` and `failed` groups.
pub fn compile_summary_pattern(pattern: &str) -> Result<Regex, String> {
    let regex = Regex::new(pattern).map_err(|e| format!("invalid summary_pattern: {}", e))?;
    let groups: Vec<&str> = regex.capture_names().flatten().collect();
    for required in ["passed", "failed"] {
        if !groups.contains(&required) {
            return Err(format!(
                "summary_pattern is missing the named group '{}'",
                required
            ));
        }
    }
    Ok(regex)
}

/// Loaded workspace configuration bound to its workspace root.
#[derive(Debug)]
pub struct ConfigService {
    root: PathBuf,
    config_path: Option<PathBuf>,
    config: WorkspaceConfig,
}

impl ConfigService {
    /// Load the workspace configuration.
    ///
    /// An explicit path must exist. Without one, `<root>/labctl.toml` is used
    /// when present and defaults otherwise.
    pub fn load(root: impl Into<PathBuf>, explicit: Option<&Path>) -> AppResult<Self> {
        let root = root.into();
        let path = match explicit {
            Some(path) => {
                let path = resolve_against(&root, path);
                if !path.is_file() {
                    return Err(AppError::config(format!(
                        "config file not found: {}",
                        path.display()
                    )));
                }
                Some(path)
            }
            None => Some(config_path(&root)).filter(|p| p.is_file()),
        };

        let config = match &path {
            Some(path) => Self::load_from_file(path)?,
            None => WorkspaceConfig::default(),
        };
        tracing::debug!(
            root = %root.display(),
            config = ?path,
            modules = config.modules.len(),
            executors = config.executors.len(),
            "loaded workspace configuration"
        );

        Ok(Self {
            root,
            config_path: path,
            config,
        })
    }

    /// Build a service from an in-memory config.
    pub fn from_config(root: impl Into<PathBuf>, config: WorkspaceConfig) -> AppResult<Self> {
        config.validate()?;
        Ok(Self {
            root: root.into(),
            config_path: None,
            config,
        })
    }

    fn load_from_file(path: &Path) -> AppResult<WorkspaceConfig> {
        let content = fs::read_to_string(path)?;
        WorkspaceConfig::parse(&content)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    /// Report directory: CLI override, then config, then `<root>/reports`.
    pub fn output_dir(&self, cli_override: Option<&Path>) -> PathBuf {
        let dir = cli_override
            .map(Path::to_path_buf)
            .or_else(|| self.config.output_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
        resolve_against(&self.root, &dir)
    }

    /// Built-in profiles merged with the workspace's overrides.
    pub fn profile_catalog(&self) -> AppResult<ProfileCatalog> {
        Ok(ProfileCatalog::builtin()?.with_overrides(&self.config.profiles))
    }

    /// Modules in discovery order.
    ///
    /// Declared `[[modules]]` come first, in file order, followed by the
    /// sub-directories of `modules_root` sorted by name. Hidden directories
    /// and names already declared are skipped.
    pub fn discover_modules(&self) -> AppResult<Vec<ModuleDescriptor>> {
        let mut modules: Vec<ModuleDescriptor> = self
            .config
            .modules
            .iter()
            .map(|m| ModuleDescriptor::new(m.name.clone(), resolve_against(&self.root, &m.path)))
            .collect();

        let scan_root = match &self.config.modules_root {
            Some(dir) => {
                let dir = resolve_against(&self.root, dir);
                if !dir.is_dir() {
                    return Err(AppError::config(format!(
                        "modules_root is not a directory: {}",
                        dir.display()
                    )));
                }
                Some(dir)
            }
            None => Some(self.root.join(DEFAULT_MODULES_ROOT)).filter(|d| d.is_dir()),
        };

        if let Some(dir) = scan_root {
            let mut found: Vec<(String, PathBuf)> = Vec::new();
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                if !entry.file_type()?.is_dir() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with('.') {
                    continue;
                }
                found.push((name, entry.path()));
            }
            found.sort_by(|a, b| a.0.cmp(&b.0));

            for (name, path) in found {
                if modules.iter().any(|m| m.name == name) {
                    continue;
                }
                modules.push(ModuleDescriptor::new(name, path));
            }
        }

        tracing::debug!(count = modules.len(), "discovered modules");
        Ok(modules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
output_dir = "out/reports"
modules_root = "mods"

[[modules]]
name = "Shared"
path = "lib/shared"

[profiles.ci]
batch_size = 5

[profiles.nightly]
max_concurrency = 2
retry_count = 2

[executors.environment]
program = "lint"
args = ["--module", "{module}", "{path}"]

[executors.default]
program = "run-tests"
args = ["{phase}", "{module}"]
summary_pattern = 'passed=(?P<passed>\d+) failed=(?P<failed>\d+)'
"#;

    #[test]
    fn test_parse_sample_config() {
        let config = WorkspaceConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.output_dir, Some(PathBuf::from("out/reports")));
        assert_eq!(config.modules.len(), 1);
        assert_eq!(config.profiles["nightly"].retry_count, Some(2));

        let (by_phase, default) = config.phase_executors().unwrap();
        assert_eq!(by_phase.len(), 1);
        assert_eq!(by_phase[0].0, PhaseKind::Environment);
        assert_eq!(default.unwrap().program, "run-tests");
    }

    #[test]
    fn test_unknown_phase_key_rejected() {
        let err = WorkspaceConfig::parse("[executors.smoke]\nprogram = \"x\"\n").unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("smoke"));
    }

    #[test]
    fn test_summary_pattern_needs_named_groups() {
        let toml = "[executors.unit]\nprogram = \"x\"\nsummary_pattern = '(\\d+) ok'\n";
        let err = WorkspaceConfig::parse(toml).unwrap_err();
        assert!(err.to_string().contains("passed"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(WorkspaceConfig::parse("modules_dir = \"x\"\n").is_err());
    }

    #[test]
    fn test_duplicate_module_rejected() {
        let toml = "[[modules]]\nname = \"A\"\npath = \"a\"\n[[modules]]\nname = \"A\"\npath = \"b\"\n";
        let err = WorkspaceConfig::parse(toml).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let service = ConfigService::load(temp_dir.path(), None).unwrap();
        assert!(service.config_path().is_none());
        assert_eq!(service.output_dir(None), temp_dir.path().join("reports"));
        assert!(service.discover_modules().unwrap().is_empty());
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let err = ConfigService::load(temp_dir.path(), Some(Path::new("nope.toml"))).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_discovery_order() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path();
        for name in ["Zeta", "Alpha", "Shared", ".cache"] {
            fs::create_dir_all(root.join("mods").join(name)).unwrap();
        }
        fs::write(root.join("mods").join("README.md"), "not a module").unwrap();
        fs::write(root.join("labctl.toml"), SAMPLE).unwrap();

        let service = ConfigService::load(root, None).unwrap();
        let modules = service.discover_modules().unwrap();
        let names: Vec<&str> = modules.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Shared", "Alpha", "Zeta"]);
        assert_eq!(modules[0].path, root.join("lib/shared"));
        assert_eq!(service.output_dir(None), root.join("out/reports"));
        assert_eq!(
            service.output_dir(Some(Path::new("/abs/out"))),
            PathBuf::from("/abs/out")
        );
    }

    #[test]
    fn test_profile_overrides_merge() {
        let service =
            ConfigService::from_config("/ws", WorkspaceConfig::parse(SAMPLE).unwrap()).unwrap();
        let catalog = service.profile_catalog().unwrap();
        let ci = catalog.resolve("ci").unwrap();
        assert_eq!(ci.batch_size, 5);
        assert_eq!(ci.max_concurrency, 4);
        let nightly = catalog.resolve("nightly").unwrap();
        assert_eq!(nightly.max_concurrency, 2);
        assert_eq!(nightly.retry_count, 2);
    }
}
