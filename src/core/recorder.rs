//! Outcome recorder.
//!
//! Durable, append-only record of restore operations:
//! - `<state_dir>/operations/<id>/operation.json`: the full record
//! - `<state_dir>/operations/<id>/summary.json`: written once at finalize
//!
//! Every mutation rewrites the record atomically before returning, so a crash
//! between stages leaves the last persisted step as the true progress marker.

use crate::models::operation::{
    OperationStatus, OperationSummary, RestoreOperation, StepRecord, StepStatus,
};
use crate::models::rollback::RollbackSnapshot;
use crate::utils::fs as fsutil;
use crate::Result;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const OPERATION_FILE: &str = "operation.json";
const SUMMARY_FILE: &str = "summary.json";

/// File-backed operation store.
#[derive(Debug, Clone)]
pub struct OutcomeRecorder {
    root: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl OutcomeRecorder {
    /// Recorder rooted at `<state_dir>/operations`.
    pub fn new(state_dir: &Path) -> Self {
        Self {
            root: state_dir.join("operations"),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    fn operation_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    fn operation_path(&self, id: &str) -> PathBuf {
        self.operation_dir(id).join(OPERATION_FILE)
    }

    fn summary_path(&self, id: &str) -> PathBuf {
        self.operation_dir(id).join(SUMMARY_FILE)
    }

    /// Persist a newly submitted operation.
    pub fn create(&self, op: &RestoreOperation) -> Result<()> {
        let _guard = self.lock()?;
        let path = self.operation_path(&op.id);
        if path.exists() {
            return Err(crate::Error::other(format!(
                "Operation record already exists: {}",
                op.id
            )));
        }
        fsutil::write_json_atomic(op, &path)?;
        tracing::debug!("Recorded operation {}", op.id);
        Ok(())
    }

    /// Load one operation.
    pub fn get(&self, id: &str) -> Result<RestoreOperation> {
        let path = self.operation_path(id);
        if !path.exists() {
            return Err(crate::Error::OperationNotFound(id.to_string()));
        }
        fsutil::read_json(&path)
    }

    /// Most recent operations first.
    pub fn list(&self, limit: usize) -> Result<Vec<RestoreOperation>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut operations = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let path = entry.path().join(OPERATION_FILE);
            if !path.exists() {
                continue;
            }
            match fsutil::read_json::<RestoreOperation>(&path) {
                Ok(op) => operations.push(op),
                Err(e) => tracing::warn!("Skipping unreadable record {:?}: {}", path, e),
            }
        }

        operations.sort_by(|a, b| {
            b.started_at
                .cmp(&a.started_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        operations.truncate(limit);
        Ok(operations)
    }

    /// Append a step. At most one step may be RUNNING.
    pub fn append_step(&self, id: &str, step: StepRecord) -> Result<()> {
        self.mutate(id, |op| {
            if op.is_terminal() {
                return Err(crate::Error::AlreadyFinalized(op.id.clone()));
            }
            if step.status == StepStatus::Running {
                if let Some(running) = op.running_step() {
                    return Err(crate::Error::StepConflict(format!(
                        "{}: step {} is still running",
                        op.id, running.name
                    )));
                }
            }
            tracing::debug!("{}: step {} {}", op.id, step.name, step.status);
            op.steps.push(step);
            Ok(())
        })
    }

    /// Move the running step to a terminal status.
    pub fn complete_step(&self, id: &str, status: StepStatus, details: &str) -> Result<StepRecord> {
        if !status.is_terminal() {
            return Err(crate::Error::StepConflict(format!(
                "{}: cannot complete a step as {}",
                id, status
            )));
        }

        self.mutate(id, |op| {
            let op_id = op.id.clone();
            let step = op
                .steps
                .iter_mut()
                .find(|s| s.status == StepStatus::Running)
                .ok_or_else(|| {
                    crate::Error::StepConflict(format!("{}: no running step", op_id))
                })?;
            step.status = status;
            step.finished_at = Some(Utc::now());
            step.details = details.to_string();
            Ok(step.clone())
        })
    }

    /// Advance a live operation through the state machine.
    ///
    /// Terminal statuses go through `finalize`.
    pub fn set_status(&self, id: &str, to: OperationStatus) -> Result<()> {
        self.mutate(id, |op| {
            if to.is_terminal() || !op.status.can_transition_to(to) {
                return Err(crate::Error::IllegalTransition {
                    operation_id: op.id.clone(),
                    from: op.status.to_string(),
                    to: to.to_string(),
                });
            }
            tracing::info!("{}: {} -> {}", op.id, op.status, to);
            op.status = to;
            Ok(())
        })
    }

    /// Record the rollback snapshot. Write-once.
    pub fn attach_snapshot(&self, id: &str, snapshot: &RollbackSnapshot) -> Result<()> {
        self.mutate(id, |op| {
            if op.snapshot.is_some() {
                return Err(crate::Error::StepConflict(format!(
                    "{}: snapshot already recorded",
                    op.id
                )));
            }
            op.snapshot = Some(snapshot.clone());
            Ok(())
        })
    }

    /// Set the terminal status and end time, exactly once.
    pub fn finalize(
        &self,
        id: &str,
        status: OperationStatus,
        ended_at: DateTime<Utc>,
    ) -> Result<RestoreOperation> {
        let op = self.mutate(id, |op| {
            if op.is_terminal() || op.ended_at.is_some() {
                return Err(crate::Error::AlreadyFinalized(op.id.clone()));
            }
            if !status.is_terminal() || !op.status.can_transition_to(status) {
                return Err(crate::Error::IllegalTransition {
                    operation_id: op.id.clone(),
                    from: op.status.to_string(),
                    to: status.to_string(),
                });
            }
            if let Some(running) = op.running_step() {
                return Err(crate::Error::StepConflict(format!(
                    "{}: cannot finalize while {} is running",
                    op.id, running.name
                )));
            }
            tracing::info!("{}: {} -> {}", op.id, op.status, status);
            op.status = status;
            op.ended_at = Some(ended_at);
            Ok(op.clone())
        })?;

        fsutil::write_json_atomic(&OperationSummary::from_operation(&op), &self.summary_path(id))?;
        Ok(op)
    }

    /// Terminal summary document, once finalized.
    pub fn summary(&self, id: &str) -> Result<OperationSummary> {
        let path = self.summary_path(id);
        if !path.exists() {
            return Err(crate::Error::OperationNotFound(format!("{} (no summary)", id)));
        }
        fsutil::read_json(&path)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| crate::Error::other("outcome recorder lock poisoned"))
    }

    /// Load, modify and atomically rewrite one record.
    fn mutate<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut RestoreOperation) -> Result<T>,
    ) -> Result<T> {
        let _guard = self.lock()?;
        let mut op = self.get(id)?;
        let value = f(&mut op)?;
        fsutil::write_json_atomic(&op, &self.operation_path(id))?;
        Ok(value)
    }
}
