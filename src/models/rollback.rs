//! Rollback snapshot model.

use crate::models::operation::RestoreMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Pre-restore copy of live data, captured before any destructive action.
///
/// Write-once: created during `prepare_environment`, read by replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackSnapshot {
    /// Owning operation.
    pub operation_id: String,
    /// Backup the owning operation was restoring.
    pub backup_reference: String,
    /// Mode of the owning operation; replay touches the same parts of the stack.
    pub mode: RestoreMode,
    /// Where the database dump and volume archives were written.
    pub location: PathBuf,
    /// Capture time.
    pub created_at: DateTime<Utc>,
}

impl RollbackSnapshot {
    pub fn new(operation_id: &str, backup_reference: &str, mode: RestoreMode, location: &Path) -> Self {
        Self {
            operation_id: operation_id.to_string(),
            backup_reference: backup_reference.to_string(),
            mode,
            location: location.to_path_buf(),
            created_at: Utc::now(),
        }
    }
}

/// Which half of a replay ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayPhase {
    Database,
    Volumes,
}

/// Result of replaying a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayOutcome {
    /// Phases that completed, in order.
    pub completed: Vec<ReplayPhase>,
    /// Phase that failed, if any. Later phases are not attempted.
    pub failed: Option<ReplayPhase>,
    /// Diagnostics from every attempted phase.
    pub details: String,
}

impl ReplayOutcome {
    pub fn is_success(&self) -> bool {
        self.failed.is_none()
    }
}
