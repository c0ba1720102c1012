use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

/// CLI definition for the labctl binary.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, name = "labctl")]
pub struct Cli {
    /// Workspace root
    #[arg(short = 'w', long, global = true, default_value = ".")]
    pub workspace: PathBuf,
    /// Path to the workspace configuration file (default: <workspace>/labctl.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    /// Increase log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
    /// Only print warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
    #[command(subcommand)]
    pub command: LabCommand,
}

impl Cli {
    /// Log level forced by `-v`/`-q`, if any.
    pub fn log_override(&self) -> Option<&'static str> {
        if self.quiet {
            return Some("warn");
        }
        match self.verbose {
            0 => None,
            1 => Some("debug"),
            _ => Some("trace"),
        }
    }
}

/// Which units to run and how.
#[derive(Args, Debug, Clone, Default)]
pub struct Selection {
    /// Scope: all, full, quick, environment, unit, integration, performance, non-interactive
    #[arg(short, long, default_value = "all")]
    pub scope: String,
    /// Execution profile (development, ci, production, debug, or one from labctl.toml)
    #[arg(short, long, default_value = "development")]
    pub profile: String,
    /// Only run these modules (repeatable)
    #[arg(short, long = "module", value_name = "NAME")]
    pub modules: Vec<String>,
    /// Run one batch at a time
    #[arg(long)]
    pub sequential: bool,
    /// Override the profile's batch size
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// Override the profile's concurrency limit
    #[arg(long)]
    pub max_concurrency: Option<usize>,
}

/// Supported subcommands.
#[derive(Subcommand, Debug)]
pub enum LabCommand {
    /// Execute a validation run and write reports
    Run {
        #[command(flatten)]
        selection: Selection,
        /// Report directory (default: output_dir from config, else <workspace>/reports)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// Show the expanded plan without executing anything
    Plan {
        #[command(flatten)]
        selection: Selection,
    },
    /// List available execution profiles
    Profiles,
}
