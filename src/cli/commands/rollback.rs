//! Rollback command implementation.
//!
//! Replays the rollback snapshot of a finished operation.

use crate::core::orchestrator::Orchestrator;
use crate::models::config::Config;
use crate::models::rollback::ReplayOutcome;
use crate::Result;
use colored::Colorize;

/// Replay the snapshot of `operation_id`.
pub async fn rollback(config: Config, operation_id: &str) -> Result<ReplayOutcome> {
    println!("{}", "[ROLLBACK] Rollback command".bold().cyan());
    println!();

    let orchestrator = Orchestrator::from_config(config)?;
    let op = orchestrator.recorder().get(operation_id)?;

    println!("  {} {}", "Operation:".bold(), op.id);
    println!("  {} {}", "Status:".bold(), op.status);
    if let Some(snapshot) = &op.snapshot {
        println!("  {} {}", "Snapshot:".bold(), snapshot.location.display());
        println!("  {} {}", "Captured:".bold(), snapshot.created_at.to_rfc3339());
    }
    println!();
    println!(
        "{}",
        "[WARNING] This will overwrite the live database and volumes with the snapshot!"
            .bold()
            .yellow()
    );
    println!();

    let outcome = orchestrator.manual_rollback(operation_id).await?;

    println!("{}", "[Rollback Summary]".bold().green());
    for line in outcome.details.lines() {
        println!("  {}", line);
    }
    println!();

    if outcome.is_success() {
        println!("{}", "[OK] Rollback completed successfully!".green());
    } else {
        println!(
            "{}",
            "[CRITICAL] Rollback failed; manual intervention required".bold().red()
        );
    }

    Ok(outcome)
}
