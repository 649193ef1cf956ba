//! Run command implementation.
//!
//! Submits a restore, runs it to a terminal status and prints the outcome.
//! Ctrl-C cancels the running stage.

use crate::cli::commands::status::print_operation;
use crate::core::orchestrator::Orchestrator;
use crate::core::status::OperationView;
use crate::models::config::Config;
use crate::models::operation::OperationStatus;
use crate::Result;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;

/// Run a restore; returns its terminal status.
pub async fn run(config: Config, backup_reference: &str, mode: &str) -> Result<OperationStatus> {
    println!("{}", "[RESTORE] Starting restore...".bold().cyan());
    println!();

    let orchestrator = Arc::new(Orchestrator::from_config(config)?);
    let id = orchestrator.submit(backup_reference, mode).await?;

    println!("  {} {}", "Operation:".bold(), id);
    println!("  {} {}", "Backup:".bold(), backup_reference);
    println!("  {} {}", "Mode:".bold(), mode);
    println!(
        "  {} {}",
        "Rollback on failure:".bold(),
        if orchestrator.config().rollback_on_failure { "yes" } else { "no" }
    );
    println!();
    println!("{}", "[WARNING] This will overwrite the live database and volumes!".bold().yellow());
    println!();

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(120));

    let poller = {
        let recorder = orchestrator.recorder().clone();
        let pb = pb.clone();
        let id = id.clone();
        tokio::spawn(async move {
            loop {
                if let Ok(op) = recorder.get(&id) {
                    let step = op
                        .running_step()
                        .map(|s| s.name.as_str())
                        .unwrap_or("-");
                    pb.set_message(format!("{} ({})", op.status, step));
                }
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        })
    };

    let canceller = {
        let orchestrator = orchestrator.clone();
        let id = id.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                if let Err(e) = orchestrator.cancel(&id).await {
                    tracing::warn!("Cancel request ignored: {}", e);
                }
            }
        })
    };

    let result = orchestrator.run(&id).await;
    poller.abort();
    canceller.abort();
    pb.finish_and_clear();

    let op = result?;
    print_operation(&OperationView::new(op.clone()));
    println!();

    match op.status {
        OperationStatus::Completed => {
            println!("{}", "[OK] Restore completed successfully!".green());
        }
        OperationStatus::RolledBack => {
            println!(
                "{}",
                "[FAILED] Restore failed; previous state restored from snapshot".yellow()
            );
        }
        _ => {
            println!("{}", "[FAILED] Restore failed".red());
            println!();
            println!("{}", "[Next Steps]".bold().yellow());
            println!(
                "  Inspect: {}",
                format!("restore-orchestrator status {}", op.id).cyan()
            );
            if op.snapshot.is_some() && !op.rollback_failed() {
                println!(
                    "  Undo:    {}",
                    format!("restore-orchestrator rollback {}", op.id).cyan()
                );
            }
        }
    }

    Ok(op.status)
}
