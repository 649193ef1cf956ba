//! Restore operation data model.

use crate::models::rollback::RollbackSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// What part of the stack a restore touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreMode {
    Full,
    DatabaseOnly,
    VolumesOnly,
    ConfigOnly,
    DisasterRecovery,
}

impl RestoreMode {
    pub const ALL: [RestoreMode; 5] = [
        RestoreMode::Full,
        RestoreMode::DatabaseOnly,
        RestoreMode::VolumesOnly,
        RestoreMode::ConfigOnly,
        RestoreMode::DisasterRecovery,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RestoreMode::Full => "full",
            RestoreMode::DatabaseOnly => "database_only",
            RestoreMode::VolumesOnly => "volumes_only",
            RestoreMode::ConfigOnly => "config_only",
            RestoreMode::DisasterRecovery => "disaster_recovery",
        }
    }
}

impl fmt::Display for RestoreMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RestoreMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        RestoreMode::ALL
            .into_iter()
            .find(|m| m.as_str() == normalized)
            .ok_or_else(|| crate::Error::InvalidMode(s.to_string()))
    }
}

/// Operation-level status. Also the state of the pipeline state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Pending,
    Initializing,
    Preflight,
    Preparing,
    Executing,
    Validating,
    HealthChecking,
    CleaningUp,
    Completed,
    RollingBack,
    Failed,
    RolledBack,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "PENDING",
            OperationStatus::Initializing => "INITIALIZING",
            OperationStatus::Preflight => "PREFLIGHT",
            OperationStatus::Preparing => "PREPARING",
            OperationStatus::Executing => "EXECUTING",
            OperationStatus::Validating => "VALIDATING",
            OperationStatus::HealthChecking => "HEALTH_CHECKING",
            OperationStatus::CleaningUp => "CLEANING_UP",
            OperationStatus::Completed => "COMPLETED",
            OperationStatus::RollingBack => "ROLLING_BACK",
            OperationStatus::Failed => "FAILED",
            OperationStatus::RolledBack => "ROLLED_BACK",
        }
    }

    /// No automatic transition leaves a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationStatus::Completed | OperationStatus::Failed | OperationStatus::RolledBack
        )
    }

    /// States whose failure may branch into `RollingBack`.
    pub fn can_roll_back_from(&self) -> bool {
        matches!(
            self,
            OperationStatus::Preflight
                | OperationStatus::Preparing
                | OperationStatus::Executing
                | OperationStatus::Validating
                | OperationStatus::HealthChecking
        )
    }

    /// Next state on the success path, if any.
    pub fn next(&self) -> Option<OperationStatus> {
        use OperationStatus::*;
        match self {
            Pending => Some(Initializing),
            Initializing => Some(Preflight),
            Preflight => Some(Preparing),
            Preparing => Some(Executing),
            Executing => Some(Validating),
            Validating => Some(HealthChecking),
            HealthChecking => Some(CleaningUp),
            CleaningUp => Some(Completed),
            _ => None,
        }
    }

    /// Transition table of the restore state machine.
    pub fn can_transition_to(&self, to: OperationStatus) -> bool {
        use OperationStatus::*;
        if self.is_terminal() {
            return false;
        }
        if self.next() == Some(to) {
            return true;
        }
        match (self, to) {
            (RollingBack, RolledBack) => true,
            (from, RollingBack) => from.can_roll_back_from(),
            // Every live state may fail; RollingBack fails when the replay does.
            (_, Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stage identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    Preflight,
    PrepareEnvironment,
    ExecuteRestore,
    ValidateRestore,
    HealthCheck,
    Cleanup,
    Rollback,
}

impl StepName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::Preflight => "preflight",
            StepName::PrepareEnvironment => "prepare_environment",
            StepName::ExecuteRestore => "execute_restore",
            StepName::ValidateRestore => "validate_restore",
            StepName::HealthCheck => "health_check",
            StepName::Cleanup => "cleanup",
            StepName::Rollback => "rollback",
        }
    }

    /// Operation status while this step is running.
    pub fn status(&self) -> OperationStatus {
        match self {
            StepName::Preflight => OperationStatus::Preflight,
            StepName::PrepareEnvironment => OperationStatus::Preparing,
            StepName::ExecuteRestore => OperationStatus::Executing,
            StepName::ValidateRestore => OperationStatus::Validating,
            StepName::HealthCheck => OperationStatus::HealthChecking,
            StepName::Cleanup => OperationStatus::CleaningUp,
            StepName::Rollback => OperationStatus::RollingBack,
        }
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Running,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StepStatus::Running)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepStatus::Running => "RUNNING",
            StepStatus::Completed => "COMPLETED",
            StepStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Outcome of one pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Stage identifier.
    pub name: StepName,
    /// Current step status.
    pub status: StepStatus,
    /// When the step started.
    pub timestamp: DateTime<Utc>,
    /// When the step reached a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Free-form diagnostics.
    #[serde(default)]
    pub details: String,
}

impl StepRecord {
    /// A freshly started step.
    pub fn running(name: StepName) -> Self {
        Self {
            name,
            status: StepStatus::Running,
            timestamp: Utc::now(),
            finished_at: None,
            details: String::new(),
        }
    }
}

/// One end-to-end restore attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreOperation {
    /// Unique, time-ordered identifier.
    pub id: String,
    /// Locator of the source backup.
    pub backup_reference: String,
    /// Restore mode.
    pub mode: RestoreMode,
    /// Current state.
    pub status: OperationStatus,
    /// Whether a failed stage triggers snapshot replay.
    pub rollback_on_failure: bool,
    /// Submission time.
    pub started_at: DateTime<Utc>,
    /// Set exactly once, at a terminal status.
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    /// Steps in execution order.
    #[serde(default)]
    pub steps: Vec<StepRecord>,
    /// Pre-restore snapshot, once captured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<RollbackSnapshot>,
}

impl RestoreOperation {
    /// Create a pending operation with a fresh id.
    pub fn new(backup_reference: &str, mode: RestoreMode, rollback_on_failure: bool) -> Self {
        Self {
            id: new_operation_id(),
            backup_reference: backup_reference.to_string(),
            mode,
            status: OperationStatus::Pending,
            rollback_on_failure,
            started_at: Utc::now(),
            ended_at: None,
            steps: Vec::new(),
            snapshot: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The step currently running, if any.
    pub fn running_step(&self) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.status == StepStatus::Running)
    }

    pub fn last_step(&self) -> Option<&StepRecord> {
        self.steps.last()
    }

    /// Number of steps with the given status.
    pub fn count_steps(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }

    /// The first step that failed, excluding rollback.
    pub fn failed_stage(&self) -> Option<&StepRecord> {
        self.steps
            .iter()
            .find(|s| s.status == StepStatus::Failed && s.name != StepName::Rollback)
    }

    /// The rollback step, if one ran.
    pub fn rollback_step(&self) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.name == StepName::Rollback)
    }

    /// FAILED because the replay itself failed.
    pub fn rollback_failed(&self) -> bool {
        self.status == OperationStatus::Failed
            && self
                .rollback_step()
                .map(|s| s.status == StepStatus::Failed)
                .unwrap_or(false)
    }
}

/// Terminal summary document written at finalize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationSummary {
    pub operation_id: String,
    pub status: OperationStatus,
    /// Seconds between start and end.
    pub duration: Option<i64>,
    pub total_steps: usize,
    pub successful_steps: usize,
    pub failed_steps: usize,
}

impl OperationSummary {
    pub fn from_operation(op: &RestoreOperation) -> Self {
        Self {
            operation_id: op.id.clone(),
            status: op.status,
            duration: op.ended_at.map(|end| (end - op.started_at).num_seconds()),
            total_steps: op.steps.len(),
            successful_steps: op.count_steps(StepStatus::Completed),
            failed_steps: op.count_steps(StepStatus::Failed),
        }
    }
}

/// Generate a time-ordered operation id.
pub fn new_operation_id() -> String {
    format!(
        "restore_{}_{}",
        Utc::now().format("%Y%m%dT%H%M%S%3f"),
        &Uuid::new_v4().simple().to_string()[..8]
    )
}
