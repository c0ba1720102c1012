//! Command-backed Unit Executors
//!
//! Runs an external program once per unit, with the unit's module, path
//! and phase substituted into its arguments. Exit status decides success;
//! an optional summary pattern extracts passed/failed test counts from the
//! program's output.
//!
//! Commands run on tokio's process driver. Each one leads its own process
//! group, and the whole group is killed when the unit timeout elapses.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use labctl_core::PhaseKind;
use labctl_orchestrator::{PhaseHandlers, Unit, UnitContext, UnitExecutor, UnitOutcome};
use regex::Regex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::runtime::{Builder, Handle, RuntimeFlavor};
use tokio::time::timeout;

use crate::storage::config::{
    compile_summary_pattern, ExecutorSpec, WorkspaceConfig, DEFAULT_EXECUTOR_KEY,
};
use crate::utils::error::{AppError, AppResult};

/// Maximum output size to capture per stream (bytes)
const MAX_OUTPUT_SIZE: usize = 64 * 1024;

/// Output lines kept as result details
const DETAIL_LINES: usize = 20;

/// Runs one external command per unit.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    spec: ExecutorSpec,
    summary: Option<Regex>,
    workspace_root: PathBuf,
}

impl CommandExecutor {
    pub fn new(spec: ExecutorSpec, workspace_root: impl Into<PathBuf>) -> AppResult<Self> {
        let summary = spec
            .summary_pattern
            .as_deref()
            .map(compile_summary_pattern)
            .transpose()
            .map_err(AppError::config)?;
        Ok(Self {
            spec,
            summary,
            workspace_root: workspace_root.into(),
        })
    }

    fn module_path(&self, unit: &Unit) -> PathBuf {
        unit.payload_str("path")
            .map(PathBuf::from)
            .unwrap_or_else(|| self.workspace_root.clone())
    }

    /// Substitute unit placeholders into a template.
    fn expand(&self, template: &str, unit: &Unit) -> String {
        template
            .replace("{module}", &unit.module_name)
            .replace("{path}", &self.module_path(unit).to_string_lossy())
            .replace("{phase}", unit.phase.as_str())
            .replace("{unit}", &unit.id)
            .replace("{attempt}", &unit.attempt.to_string())
    }

    fn build_command(&self, unit: &Unit) -> Command {
        let working_dir = match &self.spec.working_dir {
            Some(dir) => {
                let dir = PathBuf::from(self.expand(dir, unit));
                if dir.is_absolute() {
                    dir
                } else {
                    self.workspace_root.join(dir)
                }
            }
            None => self.module_path(unit),
        };

        let mut cmd = Command::new(&self.spec.program);
        cmd.args(self.spec.args.iter().map(|arg| self.expand(arg, unit)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        if working_dir.is_dir() {
            cmd.current_dir(&working_dir);
        }
        for (key, value) in &self.spec.env {
            cmd.env(key, self.expand(value, unit));
        }
        cmd.env("LABCTL_MODULE", &unit.module_name)
            .env("LABCTL_PHASE", unit.phase.as_str())
            .env("LABCTL_UNIT", &unit.id);
        cmd
    }

    /// Spawn the unit's command and wait for it, at most `limit`.
    async fn run(&self, unit: &Unit, limit: Duration) -> UnitOutcome {
        let mut cmd = self.build_command(unit);
        tracing::debug!(unit = %unit.id, program = %self.spec.program, "spawning unit command");

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return UnitOutcome::failed(format!(
                    "Command '{}' not found in PATH",
                    self.spec.program
                ));
            }
            Err(e) => return UnitOutcome::failed(format!("Failed to execute command: {}", e)),
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let finished = async {
            let (status, stdout, stderr) =
                tokio::join!(child.wait(), read_capped(stdout), read_capped(stderr));
            status.map(|status| (status, stdout, stderr))
        };

        let waited = timeout(limit, finished).await;
        match waited {
            Ok(Ok((status, stdout, stderr))) => self.interpret(status, &stdout, &stderr),
            Ok(Err(e)) => UnitOutcome::failed(format!("Failed to wait for command: {}", e)),
            Err(_) => {
                tracing::warn!(unit = %unit.id, timeout = ?limit, "unit command timed out");
                kill_tree(&mut child).await;
                UnitOutcome::failed(format!("Command timed out after {:?}", limit))
            }
        }
    }

    /// Turn a finished process into an outcome.
    fn interpret(&self, status: ExitStatus, stdout: &str, stderr: &str) -> UnitOutcome {
        let counts = self.summary.as_ref().and_then(|re| parse_counts(re, stdout, stderr));
        let details = tail_lines(stdout, stderr, DETAIL_LINES);

        let mut outcome = match counts {
            Some((passed, failed)) => UnitOutcome::from_counts(passed + failed, passed, failed),
            None if status.success() => UnitOutcome::passed(),
            None => UnitOutcome::failed(exit_message(status)),
        };
        if !status.success() && outcome.success {
            outcome.success = false;
            outcome.error = Some(exit_message(status));
        } else if !outcome.success && outcome.error.is_none() {
            outcome.error = Some(format!("{} test(s) failed", outcome.tests_failed));
        }
        outcome.with_details(details)
    }
}

impl UnitExecutor for CommandExecutor {
    fn execute(&self, unit: &Unit, ctx: &UnitContext) -> UnitOutcome {
        block_on(self.run(unit, ctx.timeout_per_unit))
            .unwrap_or_else(|e| UnitOutcome::failed(format!("No process driver available: {}", e)))
    }
}

/// Drive `fut` to completion from a synchronous worker.
///
/// Workers are blocking-pool threads of the surrounding runtime, or a plain
/// thread when the orchestrator runs without one; the latter gets a
/// private current-thread runtime.
fn block_on<F: Future>(fut: F) -> std::io::Result<F::Output> {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            Ok(tokio::task::block_in_place(|| handle.block_on(fut)))
        }
        Ok(handle) => Ok(handle.block_on(fut)),
        Err(_) => Ok(Builder::new_current_thread().enable_all().build()?.block_on(fut)),
    }
}

/// Kill the child's process group, then the child itself.
async fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;
        if let Some(pid) = child.id() {
            if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                tracing::debug!(pid, error = %e, "killpg failed");
            }
        }
    }
    let _ = child.kill().await;
}

async fn read_capped<R: AsyncRead + Unpin>(stream: Option<R>) -> String {
    let Some(mut stream) = stream else {
        return String::new();
    };
    let mut buf = Vec::new();
    let _ = stream.read_to_end(&mut buf).await;
    truncate_output(&buf, MAX_OUTPUT_SIZE)
}

/// Build the phase handler table from `[executors]`.
pub fn build_handlers(config: &WorkspaceConfig, workspace_root: &Path) -> AppResult<PhaseHandlers> {
    let (by_phase, default) = config.phase_executors()?;
    let mut handlers = PhaseHandlers::new();
    for (phase, spec) in by_phase {
        handlers.register(phase, command_handler(spec, workspace_root)?);
    }
    if let Some(spec) = default {
        handlers = handlers.with_fallback(command_handler(spec, workspace_root)?);
    }
    Ok(handlers)
}

fn command_handler(spec: &ExecutorSpec, workspace_root: &Path) -> AppResult<Arc<dyn UnitExecutor>> {
    Ok(Arc::new(CommandExecutor::new(spec.clone(), workspace_root)?))
}

/// Phases of `phases` that `config` has no executor for.
pub fn uncovered_phases(config: &WorkspaceConfig, phases: &[PhaseKind]) -> Vec<PhaseKind> {
    if config.executors.contains_key(DEFAULT_EXECUTOR_KEY) {
        return Vec::new();
    }
    let declared: Vec<PhaseKind> = config
        .executors
        .keys()
        .filter_map(|key| key.parse().ok())
        .collect();
    phases
        .iter()
        .filter(|phase| !declared.contains(phase))
        .copied()
        .collect()
}

/// Last `passed`/`failed` match across both streams.
fn parse_counts(re: &Regex, stdout: &str, stderr: &str) -> Option<(u64, u64)> {
    [stdout, stderr]
        .iter()
        .flat_map(|text| re.captures_iter(text))
        .filter_map(|caps| {
            let passed = caps.name("passed")?.as_str().parse().ok()?;
            let failed = caps.name("failed")?.as_str().parse().ok()?;
            Some((passed, failed))
        })
        .last()
}

fn exit_message(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("Command exited with status {}", code),
        None => "Command terminated by signal".to_string(),
    }
}

fn tail_lines(stdout: &str, stderr: &str, keep: usize) -> Vec<String> {
    let lines: Vec<&str> = stdout
        .lines()
        .chain(stderr.lines())
        .filter(|l| !l.trim().is_empty())
        .collect();
    let skip = lines.len().saturating_sub(keep);
    lines[skip..].iter().map(|l| l.to_string()).collect()
}

/// Truncate output to max size on a char boundary
fn truncate_output(bytes: &[u8], max: usize) -> String {
    let s = String::from_utf8_lossy(bytes);
    if s.len() <= max {
        return s.into_owned();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}\n... (output truncated)", &s[..cut])
}
