use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::commands::run::RunOptions;
use crate::commands::{self, Cli, LabCommand};
use crate::utils::error::EXIT_CONFIG_ERROR;

/// Install the fmt subscriber. `RUST_LOG` wins over `default_level`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing(default_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
        .try_init();
}

/// Entry point invoked by `main.rs`. Parses arguments, dispatches to the
/// command and returns the process exit code.
pub async fn run() -> Result<i32> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() { EXIT_CONFIG_ERROR } else { 0 };
            let _ = err.print();
            return Ok(code);
        }
    };

    let log_override = cli.log_override();
    match cli.command {
        LabCommand::Run {
            selection,
            output_dir,
        } => commands::run::execute(RunOptions {
            workspace: cli.workspace,
            config: cli.config,
            selection,
            output_dir,
            log_override,
            quiet: cli.quiet,
        })
        .await
        .context("run failed"),
        LabCommand::Plan { selection } => {
            init_tracing(log_override.unwrap_or("warn"));
            commands::plan::execute(&cli.workspace, cli.config.as_deref(), &selection)
                .context("could not build plan")
        }
        LabCommand::Profiles => {
            init_tracing(log_override.unwrap_or("warn"));
            commands::profiles::execute(&cli.workspace, cli.config.as_deref())
                .context("could not load profiles")
        }
    }
}
