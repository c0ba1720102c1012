//! labctl - Rust Library
//!
//! Application layer around the orchestrator crates:
//! - CLI commands (`run`, `plan`, `profiles`)
//! - Workspace configuration and module discovery
//! - Command-backed unit executors, reporters and progress output
//! - Logging bootstrap and error types

pub mod bootstrap;
pub mod commands;
pub mod services;
pub mod storage;
pub mod utils;

pub use commands::{prepare_plan, Cli, LabCommand, Selection};
pub use services::{build_handlers, CommandExecutor, ConsoleProgress, FileReporter, Reporter};
pub use storage::config::{ConfigService, ExecutorSpec, WorkspaceConfig};
pub use utils::error::{AppError, AppResult};
