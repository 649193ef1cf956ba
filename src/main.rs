//! Restore Orchestrator CLI
//!
//! Restores a backup into the live system with a rollback snapshot taken first.

use clap::Parser;
use colored::Colorize;
use restore_orchestrator::cli::{
    args::{Cli, Commands},
    commands::{check, recover, rollback, run, status},
};
use restore_orchestrator::models::config::load_config;
use restore_orchestrator::models::operation::OperationStatus;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    match run_command(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            let code = e
                .downcast_ref::<restore_orchestrator::Error>()
                .map(|e| e.code())
                .unwrap_or("ERROR");
            eprintln!("{} {}: {:#}", "[ERROR]".red().bold(), code, e);
            ExitCode::FAILURE
        }
    }
}

/// Run the selected command; `Ok(false)` means it ran but did not succeed.
async fn run_command(cli: Cli) -> anyhow::Result<bool> {
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            backup_reference,
            mode,
            no_rollback,
        } => {
            if no_rollback {
                config.rollback_on_failure = false;
            }
            let status = run::run(config, &backup_reference, &mode).await?;
            Ok(status == OperationStatus::Completed)
        }

        Commands::Check { backup_reference } => {
            Ok(check::check(&config, &backup_reference).await?)
        }

        Commands::Status {
            operation_id,
            limit,
            json,
        } => {
            match operation_id {
                Some(id) => status::show_operation(&config, &id, json).await?,
                None => status::list_operations(&config, limit, json).await?,
            }
            Ok(true)
        }

        Commands::Rollback { operation_id } => {
            let outcome = rollback::rollback(config, &operation_id).await?;
            Ok(outcome.is_success())
        }

        Commands::Recover => {
            recover::recover(config).await?;
            Ok(true)
        }
    }
}

/// Initialize the logging system.
fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("restore_orchestrator=debug")
    } else {
        EnvFilter::new("restore_orchestrator=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
