//! Rollback coordinator.
//!
//! Captures a snapshot of live data before anything destructive happens, and
//! replays it when the pipeline fails:
//! - capture: database dump + volume archives into `<snapshot_dir>/<operation_id>`
//! - replay: database first, then volumes (volumes may reference database ids)
//!
//! A failed replay is never retried; it leaves the stack in an unknown state
//! that needs an operator.

use crate::core::collaborator::{CommandCollaborator, StageCollaborator, StageOutcome, StageRequest};
use crate::core::invoke::{self, StageFailure};
use crate::models::config::{CommandConfig, TimeoutConfig};
use crate::models::operation::StepName;
use crate::models::rollback::{ReplayOutcome, ReplayPhase, RollbackSnapshot};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Where snapshots come from and go back to.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Dump live data into `location`.
    async fn capture(&self, request: &StageRequest, location: &Path) -> StageOutcome;

    /// Restore the database dump held by `snapshot`.
    async fn restore_database(&self, request: &StageRequest, snapshot: &RollbackSnapshot) -> StageOutcome;

    /// Restore the volume archives held by `snapshot`.
    async fn restore_volumes(&self, request: &StageRequest, snapshot: &RollbackSnapshot) -> StageOutcome;
}

/// Snapshot source backed by the configured commands.
///
/// Commands receive the snapshot directory in `RESTORE_SNAPSHOT_LOCATION`.
/// An unset command fails: there is no safe default for capturing or
/// replaying live data.
#[derive(Debug, Clone)]
pub struct CommandSnapshotSource {
    capture: Vec<String>,
    replay_database: Vec<String>,
    replay_volumes: Vec<String>,
}

impl CommandSnapshotSource {
    pub fn from_config(commands: &CommandConfig) -> Self {
        Self {
            capture: commands.capture_snapshot.clone(),
            replay_database: commands.replay_database.clone(),
            replay_volumes: commands.replay_volumes.clone(),
        }
    }

    async fn run(argv: &[String], name: &str, request: &StageRequest, location: &Path) -> StageOutcome {
        if argv.is_empty() {
            return StageOutcome::fail(&format!("no {} command configured", name));
        }
        CommandCollaborator::new(argv.to_vec())
            .with_env("RESTORE_SNAPSHOT_LOCATION", &location.to_string_lossy())
            .invoke(request)
            .await
    }
}

#[async_trait]
impl SnapshotSource for CommandSnapshotSource {
    async fn capture(&self, request: &StageRequest, location: &Path) -> StageOutcome {
        Self::run(&self.capture, "capture_snapshot", request, location).await
    }

    async fn restore_database(&self, request: &StageRequest, snapshot: &RollbackSnapshot) -> StageOutcome {
        Self::run(&self.replay_database, "replay_database", request, &snapshot.location).await
    }

    async fn restore_volumes(&self, request: &StageRequest, snapshot: &RollbackSnapshot) -> StageOutcome {
        Self::run(&self.replay_volumes, "replay_volumes", request, &snapshot.location).await
    }
}

/// Captures and replays rollback snapshots.
#[derive(Clone)]
pub struct RollbackCoordinator {
    source: Arc<dyn SnapshotSource>,
    snapshot_dir: PathBuf,
    capture_timeout: Duration,
    replay_timeout: Duration,
}

impl RollbackCoordinator {
    pub fn new(source: Arc<dyn SnapshotSource>, snapshot_dir: &Path, timeouts: &TimeoutConfig) -> Self {
        Self {
            source,
            snapshot_dir: snapshot_dir.to_path_buf(),
            capture_timeout: timeouts.snapshot(),
            replay_timeout: timeouts.replay(),
        }
    }

    /// Snapshot location for an operation.
    pub fn location_for(&self, operation_id: &str) -> PathBuf {
        self.snapshot_dir.join(operation_id)
    }

    /// Capture the pre-restore snapshot for `request.operation_id`.
    pub async fn capture(
        &self,
        request: &StageRequest,
        cancel: &CancellationToken,
    ) -> std::result::Result<(RollbackSnapshot, String), StageFailure> {
        let location = self.location_for(&request.operation_id);
        if location.exists() {
            return Err(StageFailure::Failed(format!(
                "snapshot location {} already exists",
                location.display()
            )));
        }
        std::fs::create_dir_all(&location).map_err(|e| {
            StageFailure::Failed(format!("cannot create {}: {}", location.display(), e))
        })?;

        let details = invoke::bounded(
            self.source.capture(request, &location),
            self.capture_timeout,
            cancel,
        )
        .await?;

        let snapshot = RollbackSnapshot::new(
            &request.operation_id,
            &request.backup_reference,
            request.mode,
            &location,
        );
        tracing::info!(
            "{}: rollback snapshot captured at {}",
            request.operation_id,
            location.display()
        );
        Ok((snapshot, details))
    }

    /// Request handed to the snapshot source during replay.
    ///
    /// Carries the owning operation's backup and mode; the work dir is the
    /// snapshot location.
    pub fn replay_request(&self, snapshot: &RollbackSnapshot) -> StageRequest {
        StageRequest {
            operation_id: snapshot.operation_id.clone(),
            backup_reference: snapshot.backup_reference.clone(),
            mode: snapshot.mode,
            stage: StepName::Rollback,
            timeout: self.replay_timeout,
            work_dir: snapshot.location.clone(),
        }
    }

    /// Replay a snapshot: database, then volumes. Stops at the first failure.
    pub async fn replay(&self, snapshot: &RollbackSnapshot, cancel: &CancellationToken) -> ReplayOutcome {
        let mut outcome = ReplayOutcome::default();
        let mut lines = Vec::new();
        let request = self.replay_request(snapshot);

        for phase in [ReplayPhase::Database, ReplayPhase::Volumes] {
            let call = async {
                match phase {
                    ReplayPhase::Database => self.source.restore_database(&request, snapshot).await,
                    ReplayPhase::Volumes => self.source.restore_volumes(&request, snapshot).await,
                }
            };

            match invoke::bounded(call, self.replay_timeout, cancel).await {
                Ok(details) => {
                    lines.push(format!("{:?} restored: {}", phase, details));
                    outcome.completed.push(phase);
                }
                Err(failure) => {
                    lines.push(format!("{:?} replay {}", phase, failure));
                    outcome.failed = Some(phase);
                    break;
                }
            }
        }

        outcome.details = lines.join("\n");
        if outcome.is_success() {
            tracing::info!("{}: rollback snapshot replayed", snapshot.operation_id);
        } else {
            tracing::error!(
                "{}: rollback replay failed, manual intervention required: {}",
                snapshot.operation_id,
                outcome.details
            );
        }
        outcome
    }
}
