//! Recover command implementation.

use crate::core::orchestrator::Orchestrator;
use crate::models::config::Config;
use crate::Result;
use colored::Colorize;

/// Finalize interrupted operations and clear a stale lock.
pub async fn recover(config: Config) -> Result<()> {
    println!("{}", "[RECOVER] Checking for interrupted operations...".bold().cyan());
    println!();

    let orchestrator = Orchestrator::from_config(config)?;
    let recovered = orchestrator.recover_interrupted().await?;

    if recovered.is_empty() {
        println!("{}", "[OK] Nothing to recover".green());
    } else {
        for id in &recovered {
            println!("  {} {}", "Finalized as FAILED:".bold().yellow(), id);
        }
        println!();
        println!("{}", "[Next Steps]".bold().yellow());
        println!(
            "  Inspect each one with {} before restoring again.",
            "restore-orchestrator status <operation_id>".cyan()
        );
    }

    Ok(())
}
