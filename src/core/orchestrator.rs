//! Restore orchestrator.
//!
//! Drives one restore operation through a fixed, strictly sequential pipeline:
//!
//! PENDING -> INITIALIZING -> PREFLIGHT -> PREPARING -> EXECUTING -> VALIDATING
//!   -> HEALTH_CHECKING -> CLEANING_UP -> COMPLETED
//!
//! A failed stage ends the pipeline. If a snapshot was captured and rollback is
//! enabled, the snapshot is replayed (ROLLING_BACK -> ROLLED_BACK, or FAILED
//! when the replay fails); otherwise the operation ends FAILED.
//!
//! Restores are single-flight: `submit` takes the global restore lock and
//! finalize releases it.

use crate::core::collaborator::{Collaborators, StageRequest};
use crate::core::health;
use crate::core::invoke::{self, Invocation, StageFailure};
use crate::core::lock::{self, RestoreLock};
use crate::core::notify::{self, Notification, Notifier};
use crate::core::recorder::OutcomeRecorder;
use crate::core::rollback::{CommandSnapshotSource, RollbackCoordinator, SnapshotSource};
use crate::models::config::Config;
use crate::models::operation::{
    OperationStatus, RestoreMode, RestoreOperation, StepName, StepRecord, StepStatus,
};
use crate::models::rollback::ReplayOutcome;
use crate::preflight::{self, disk::SpaceProbe, disk::SystemSpaceProbe, CheckResult};
use crate::Result;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Stages whose failure ends the pipeline, in execution order.
const PIPELINE: [StepName; 5] = [
    StepName::Preflight,
    StepName::PrepareEnvironment,
    StepName::ExecuteRestore,
    StepName::ValidateRestore,
    StepName::HealthCheck,
];

/// The operation currently holding the restore lock in this process.
struct ActiveOperation {
    id: String,
    lock: RestoreLock,
    cancel: CancellationToken,
    started: bool,
}

/// Restore orchestrator.
pub struct Orchestrator {
    config: Config,
    recorder: OutcomeRecorder,
    collaborators: Collaborators,
    rollback: RollbackCoordinator,
    notifier: Arc<dyn Notifier>,
    space_probe: Arc<dyn SpaceProbe>,
    active: Mutex<Option<ActiveOperation>>,
}

impl Orchestrator {
    /// Create an orchestrator from explicit collaborators.
    pub fn new(
        config: Config,
        collaborators: Collaborators,
        snapshots: Arc<dyn SnapshotSource>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let recorder = OutcomeRecorder::new(&config.state_dir);
        let rollback = RollbackCoordinator::new(snapshots, &config.snapshot_dir(), &config.timeouts);
        Self {
            config,
            recorder,
            collaborators,
            rollback,
            notifier,
            space_probe: Arc::new(SystemSpaceProbe),
            active: Mutex::new(None),
        }
    }

    /// Create an orchestrator whose collaborators are the configured commands.
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;
        let collaborators = Collaborators::from_config(&config.commands);
        let snapshots = Arc::new(CommandSnapshotSource::from_config(&config.commands));
        let notifier = notify::from_config(&config.notify)?;
        Ok(Self::new(config, collaborators, snapshots, notifier))
    }

    /// Replace the free-space source used by preflight.
    pub fn with_space_probe(mut self, probe: Arc<dyn SpaceProbe>) -> Self {
        self.space_probe = probe;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn recorder(&self) -> &OutcomeRecorder {
        &self.recorder
    }

    /// Id of the operation holding the lock in this process.
    pub async fn active_operation(&self) -> Option<String> {
        self.active.lock().await.as_ref().map(|a| a.id.clone())
    }

    /// Register a restore request and take the restore lock.
    pub async fn submit(&self, backup_reference: &str, mode: &str) -> Result<String> {
        let mode: RestoreMode = mode.parse()?;
        if backup_reference.trim().is_empty() {
            return Err(crate::Error::BackupUnreachable("empty backup reference".to_string()));
        }

        let mut active = self.active.lock().await;
        if let Some(current) = active.as_ref() {
            return Err(crate::Error::OperationInProgress(current.id.clone()));
        }

        let op = RestoreOperation::new(backup_reference, mode, self.config.rollback_on_failure);
        let lock = RestoreLock::acquire(&self.config.state_dir, &op.id)?;
        self.recorder.create(&op)?;

        tracing::info!(
            "{}: submitted restore of {} (mode {}, rollback {})",
            op.id,
            op.backup_reference,
            op.mode,
            if op.rollback_on_failure { "on" } else { "off" }
        );

        *active = Some(ActiveOperation {
            id: op.id.clone(),
            lock,
            cancel: CancellationToken::new(),
            started: false,
        });
        Ok(op.id)
    }

    /// Submit and run in one call.
    pub async fn submit_and_run(&self, backup_reference: &str, mode: &str) -> Result<RestoreOperation> {
        let id = self.submit(backup_reference, mode).await?;
        self.run(&id).await
    }

    /// Run a submitted operation to its terminal status.
    ///
    /// Stage failures end in an `Ok` FAILED/ROLLED_BACK record. `Err` means the
    /// recorder itself failed; the lock is then left in place for `recover`.
    pub async fn run(&self, operation_id: &str) -> Result<RestoreOperation> {
        let cancel = {
            let mut active = self.active.lock().await;
            match active.as_mut() {
                Some(a) if a.id == operation_id && !a.started => {
                    a.started = true;
                    a.cancel.clone()
                }
                Some(a) if a.id == operation_id => {
                    return Err(crate::Error::OperationInProgress(a.id.clone()));
                }
                _ => {
                    let op = self.recorder.get(operation_id)?;
                    if op.is_terminal() {
                        return Err(crate::Error::AlreadyFinalized(op.id));
                    }
                    return Err(crate::Error::OperationInProgress(op.id));
                }
            }
        };

        let op = self.recorder.get(operation_id)?;
        match self.drive(&op, &cancel).await {
            Ok(status) => self.finish(operation_id, status).await,
            Err(e) => {
                tracing::error!(
                    "{}: outcome recorder failed, operation left unfinalized: {}",
                    operation_id,
                    e
                );
                if let Some(active) = self.active.lock().await.take() {
                    active.lock.keep();
                }
                Err(e)
            }
        }
    }

    /// Ask the active operation to stop. Its current stage is abandoned.
    pub async fn cancel(&self, operation_id: &str) -> Result<()> {
        let active = self.active.lock().await;
        match active.as_ref() {
            Some(a) if a.id == operation_id => {
                tracing::warn!("{}: cancellation requested", operation_id);
                a.cancel.cancel();
                Ok(())
            }
            _ => Err(crate::Error::OperationNotFound(format!(
                "{} is not running",
                operation_id
            ))),
        }
    }

    /// Walk the pipeline; returns the terminal status to finalize with.
    async fn drive(&self, op: &RestoreOperation, cancel: &CancellationToken) -> Result<OperationStatus> {
        let id = op.id.as_str();
        self.recorder.set_status(id, OperationStatus::Initializing)?;
        let work_dir = self.config.scratch_dir().join(id);

        for stage in PIPELINE {
            self.recorder.set_status(id, stage.status())?;
            self.recorder.append_step(id, StepRecord::running(stage))?;

            let request = self.request(op, stage, &work_dir);
            match self.run_stage(&request, cancel).await? {
                Ok(details) => {
                    self.recorder.complete_step(id, StepStatus::Completed, &details)?;
                    tracing::info!("{}: {} completed", id, stage);
                }
                Err(failure) => {
                    tracing::warn!("{}: {} {}", id, stage, failure);
                    self.recorder
                        .complete_step(id, StepStatus::Failed, &failure.to_string())?;
                    let status = self.fail(id).await?;
                    discard_work_dir(id, &work_dir);
                    return Ok(status);
                }
            }
        }

        self.recorder.set_status(id, OperationStatus::CleaningUp)?;
        self.recorder.append_step(id, StepRecord::running(StepName::Cleanup))?;
        let request = self.request(op, StepName::Cleanup, &work_dir);
        match self.cleanup(&request, cancel).await {
            Ok(details) => {
                self.recorder.complete_step(id, StepStatus::Completed, &details)?;
                tracing::info!("{}: cleanup completed", id);
            }
            Err(failure) => {
                // The restore is validated and healthy; leftovers do not undo it.
                tracing::warn!("{}: cleanup {}, restore stands", id, failure);
                self.recorder
                    .complete_step(id, StepStatus::Failed, &failure.to_string())?;
            }
        }

        Ok(OperationStatus::Completed)
    }

    fn request(&self, op: &RestoreOperation, stage: StepName, work_dir: &Path) -> StageRequest {
        StageRequest {
            operation_id: op.id.clone(),
            backup_reference: op.backup_reference.clone(),
            mode: op.mode,
            stage,
            timeout: self.stage_timeout(stage),
            work_dir: work_dir.to_path_buf(),
        }
    }

    fn stage_timeout(&self, stage: StepName) -> Duration {
        let t = &self.config.timeouts;
        match stage {
            StepName::Preflight => t.preflight(),
            StepName::PrepareEnvironment => t.snapshot(),
            StepName::ExecuteRestore => t.execute_restore(),
            StepName::ValidateRestore => t.validate_restore(),
            StepName::HealthCheck => {
                let h = &self.config.health;
                (h.interval() + h.probe_timeout()) * h.attempts
            }
            StepName::Cleanup => t.cleanup(),
            StepName::Rollback => t.replay(),
        }
    }

    /// Run one pipeline stage. The outer `Err` is a recorder failure only.
    async fn run_stage(&self, request: &StageRequest, cancel: &CancellationToken) -> Result<Invocation> {
        let c = &self.collaborators;
        let result = match request.stage {
            StepName::Preflight => self.preflight(request, cancel).await,
            StepName::PrepareEnvironment => return self.prepare(request, cancel).await,
            StepName::ExecuteRestore => {
                invoke::bounded(c.restore_executor.invoke(request), request.timeout, cancel).await
            }
            StepName::ValidateRestore => {
                invoke::bounded(c.restore_validator.invoke(request), request.timeout, cancel).await
            }
            StepName::HealthCheck => {
                health::poll(c.health_prober.as_ref(), request, &self.config.health, cancel).await
            }
            StepName::Cleanup | StepName::Rollback => {
                return Err(crate::Error::other(format!(
                    "{} is not a pipeline stage",
                    request.stage
                )));
            }
        };
        Ok(result)
    }

    /// Local checks, then the backup validator.
    async fn preflight(&self, request: &StageRequest, cancel: &CancellationToken) -> Invocation {
        if cancel.is_cancelled() {
            return Err(StageFailure::Cancelled);
        }
        if let Err(e) = std::fs::create_dir_all(&request.work_dir) {
            return Err(StageFailure::Failed(format!(
                "cannot create work dir {}: {}",
                request.work_dir.display(),
                e
            )));
        }

        // One budget covers the local checks and the validator.
        let deadline = Instant::now() + request.timeout;
        let reference = request.backup_reference.clone();
        let scratch = self.config.scratch_dir();
        let probe = self.space_probe.clone();
        let checks = tokio::task::spawn_blocking(move || {
            preflight::run_local_checks(&reference, &scratch, probe.as_ref())
        });

        // An abandoned blocking task runs to completion detached; its result is dropped.
        let checks = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StageFailure::Cancelled),
            joined = tokio::time::timeout_at(deadline, checks) => match joined {
                Ok(Ok(checks)) => checks,
                Ok(Err(e)) => {
                    return Err(StageFailure::Failed(format!("preflight checks aborted: {}", e)))
                }
                Err(_) => return Err(StageFailure::TimedOut(request.timeout)),
            },
        };

        let mut lines: Vec<String> = checks.iter().map(CheckResult::line).collect();
        if !preflight::all_passed(&checks) {
            return Err(StageFailure::Failed(lines.join("\n")));
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        match invoke::bounded(
            self.collaborators.backup_validator.invoke(request),
            remaining,
            cancel,
        )
        .await
        {
            Ok(details) => {
                lines.push(format!("[ok] validate_backup: {}", details));
                Ok(lines.join("\n"))
            }
            Err(StageFailure::Failed(details)) => {
                lines.push(format!("[fail] validate_backup: {}", details));
                Err(StageFailure::Failed(lines.join("\n")))
            }
            Err(StageFailure::TimedOut(_)) => Err(StageFailure::TimedOut(request.timeout)),
            Err(other) => Err(other),
        }
    }

    /// Capture the rollback snapshot. Without one the pipeline stops here.
    async fn prepare(&self, request: &StageRequest, cancel: &CancellationToken) -> Result<Invocation> {
        match self.rollback.capture(request, cancel).await {
            Ok((snapshot, details)) => {
                self.recorder.attach_snapshot(&request.operation_id, &snapshot)?;
                Ok(Ok(format!(
                    "snapshot at {}: {}",
                    snapshot.location.display(),
                    details
                )))
            }
            Err(failure) => Ok(Err(failure)),
        }
    }

    /// Cleanup collaborator, then remove the work dir.
    async fn cleanup(&self, request: &StageRequest, cancel: &CancellationToken) -> Invocation {
        let details =
            invoke::bounded(self.collaborators.cleanup.invoke(request), request.timeout, cancel)
                .await?;

        if request.work_dir.exists() {
            std::fs::remove_dir_all(&request.work_dir).map_err(|e| {
                StageFailure::Failed(format!(
                    "cannot remove {}: {}",
                    request.work_dir.display(),
                    e
                ))
            })?;
        }
        Ok(details)
    }

    /// Failure branch: replay the snapshot if there is one and rollback is on.
    async fn fail(&self, id: &str) -> Result<OperationStatus> {
        let op = self.recorder.get(id)?;

        if !op.rollback_on_failure {
            tracing::info!("{}: rollback disabled, leaving state as is", id);
            return Ok(OperationStatus::Failed);
        }
        let Some(snapshot) = op.snapshot.clone() else {
            tracing::info!("{}: no snapshot captured, nothing to roll back", id);
            return Ok(OperationStatus::Failed);
        };
        if !op.status.can_roll_back_from() {
            return Ok(OperationStatus::Failed);
        }

        self.recorder.set_status(id, OperationStatus::RollingBack)?;
        self.recorder.append_step(id, StepRecord::running(StepName::Rollback))?;

        // Replay runs to completion even when the operation was cancelled.
        let outcome = self.rollback.replay(&snapshot, &CancellationToken::new()).await;
        if outcome.is_success() {
            self.recorder
                .complete_step(id, StepStatus::Completed, &outcome.details)?;
            Ok(OperationStatus::RolledBack)
        } else {
            let details = format!("{}\nmanual intervention required", outcome.details);
            self.recorder.complete_step(id, StepStatus::Failed, &details)?;
            Ok(OperationStatus::Failed)
        }
    }

    /// Finalize, release the lock, notify.
    async fn finish(&self, id: &str, status: OperationStatus) -> Result<RestoreOperation> {
        let finalized = self.recorder.finalize(id, status, Utc::now());
        let active = self.active.lock().await.take();

        let op = match finalized {
            Ok(op) => {
                if let Some(active) = active {
                    if let Err(e) = active.lock.release() {
                        tracing::warn!("{}: could not remove restore lock: {}", id, e);
                    }
                }
                op
            }
            Err(e) => {
                if let Some(active) = active {
                    active.lock.keep();
                }
                return Err(e);
            }
        };

        if op.rollback_failed() {
            tracing::error!("{}: FAILED with failed rollback, manual intervention required", id);
        } else {
            tracing::info!("{}: finished {}", id, op.status);
        }

        notify::dispatch(self.notifier.as_ref(), &Notification::for_operation(&op)).await;
        Ok(op)
    }

    /// Finalize records left live by a crashed orchestrator and clear its lock.
    ///
    /// Refuses while another live process holds the lock.
    pub async fn recover_interrupted(&self) -> Result<Vec<String>> {
        let active = self.active.lock().await;
        let active_id = active.as_ref().map(|a| a.id.clone());

        let state_dir = &self.config.state_dir;
        let lock_info = lock::read(state_dir);
        if let Some(info) = &lock_info {
            let ours = info.pid == Some(std::process::id());
            if !ours && info.owner_alive() {
                return Err(crate::Error::OperationInProgress(info.holder.clone()));
            }
        }

        let mut recovered = Vec::new();
        for op in self.recorder.list(usize::MAX)? {
            if op.is_terminal() || active_id.as_deref() == Some(op.id.as_str()) {
                continue;
            }

            if op.running_step().is_some() {
                self.recorder.complete_step(
                    &op.id,
                    StepStatus::Failed,
                    "interrupted: orchestrator stopped before the step finished",
                )?;
            } else if op.steps.is_empty() {
                self.recorder
                    .append_step(&op.id, StepRecord::running(StepName::Preflight))?;
                self.recorder.complete_step(
                    &op.id,
                    StepStatus::Failed,
                    "interrupted before the pipeline started",
                )?;
            }
            self.recorder.finalize(&op.id, OperationStatus::Failed, Utc::now())?;
            tracing::warn!("{}: interrupted operation finalized as FAILED", op.id);
            recovered.push(op.id);
        }

        if active_id.is_none() && lock_info.is_some() {
            lock::force_release(state_dir)?;
            tracing::info!("Released stale restore lock");
        }

        Ok(recovered)
    }

    /// Operator-triggered replay of a finished operation's snapshot.
    ///
    /// Runs under the restore lock; the finalized record is not modified.
    pub async fn manual_rollback(&self, operation_id: &str) -> Result<ReplayOutcome> {
        if let Some(current) = self.active_operation().await {
            return Err(crate::Error::OperationInProgress(current));
        }

        let op = self.recorder.get(operation_id)?;
        if !op.is_terminal() {
            return Err(crate::Error::OperationInProgress(op.id));
        }
        let snapshot = op
            .snapshot
            .ok_or_else(|| crate::Error::SnapshotMissing(operation_id.to_string()))?;
        if !snapshot.location.exists() {
            return Err(crate::Error::SnapshotMissing(format!(
                "{} ({} no longer exists)",
                operation_id,
                snapshot.location.display()
            )));
        }

        let lock = RestoreLock::acquire(
            &self.config.state_dir,
            &format!("{}:manual_rollback", operation_id),
        )?;
        tracing::warn!(
            "{}: manual rollback from {}",
            lock.holder(),
            snapshot.location.display()
        );

        let outcome = self.rollback.replay(&snapshot, &CancellationToken::new()).await;
        lock.release()?;
        Ok(outcome)
    }
}

/// Remove a failed operation's work dir. Errors are logged only; the outcome
/// is already decided.
fn discard_work_dir(id: &str, work_dir: &Path) {
    if !work_dir.exists() {
        return;
    }
    match std::fs::remove_dir_all(work_dir) {
        Ok(()) => tracing::debug!("{}: removed work dir {}", id, work_dir.display()),
        Err(e) => tracing::warn!(
            "{}: could not remove work dir {}: {}",
            id,
            work_dir.display(),
            e
        ),
    }
}
