//! Command line argument definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Restore Orchestrator - restore the application stack from a backup
#[derive(Parser, Debug)]
#[command(name = "restore-orchestrator")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config.toml
    #[arg(short, long, global = true, value_name = "CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Restore from a backup
    Run {
        /// Backup archive path or URI
        #[arg(value_name = "BACKUP_REFERENCE")]
        backup_reference: String,

        /// Restore mode: full, database_only, volumes_only, config_only, disaster_recovery
        #[arg(value_name = "MODE", default_value = "full")]
        mode: String,

        /// Do not replay the snapshot when a stage fails
        #[arg(long)]
        no_rollback: bool,
    },

    /// Run the local preflight checks against a backup without restoring it
    Check {
        /// Backup archive path or URI
        #[arg(value_name = "BACKUP_REFERENCE")]
        backup_reference: String,
    },

    /// Show recent operations, or one operation in detail
    Status {
        /// Operation ID
        #[arg(value_name = "OPERATION_ID")]
        operation_id: Option<String>,

        /// Number of operations to list
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Replay the rollback snapshot of a finished operation
    Rollback {
        /// Operation ID
        #[arg(value_name = "OPERATION_ID")]
        operation_id: String,
    },

    /// Finalize operations interrupted by a crash and clear a stale lock
    Recover,
}
