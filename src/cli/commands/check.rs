//! Check command implementation.
//!
//! Runs the local preflight checks against a backup without restoring it.

use crate::models::config::Config;
use crate::preflight::{self, disk::SystemSpaceProbe};
use crate::Result;
use colored::Colorize;

/// Run the local preflight checks; returns whether all passed.
pub async fn check(config: &Config, backup_reference: &str) -> Result<bool> {
    println!("{}", "Running preflight checks...".bold());
    println!();

    let reference = backup_reference.to_string();
    let scratch = config.scratch_dir();
    let results = tokio::task::spawn_blocking(move || {
        preflight::run_local_checks(&reference, &scratch, &SystemSpaceProbe)
    })
    .await
    .map_err(|e| crate::Error::other(format!("preflight checks aborted: {}", e)))?;

    preflight::print_results(&results);
    println!();

    let passed = preflight::all_passed(&results);
    if passed {
        println!("{}", "[OK] Backup is ready to restore".green());
    } else {
        println!("{}", "[FAILED] Fix the issues above and try again.".red());
    }
    Ok(passed)
}
