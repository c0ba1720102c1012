//! Services
//!
//! Collaborators the orchestrator hands work and results to:
//! - `executors` - Command-backed `UnitExecutor`s built from `[executors]`
//! - `reporter` - JSON, log, HTML and markdown report files
//! - `progress` - Console progress observer

pub mod executors;
pub mod progress;
pub mod reporter;

pub use executors::{build_handlers, CommandExecutor};
pub use progress::ConsoleProgress;
pub use reporter::{FileReporter, ReportArtifacts, Reporter};
