//! Status queries.
//!
//! Read-only projections over the outcome recorder with derived fields.

use crate::core::recorder::OutcomeRecorder;
use crate::models::operation::{OperationSummary, RestoreOperation, StepStatus};
use crate::Result;
use chrono::{DateTime, Duration, Utc};

/// An operation plus derived fields.
#[derive(Debug, Clone)]
pub struct OperationView {
    pub operation: RestoreOperation,
    /// `ended_at - started_at`; `None` while the operation is live.
    pub duration: Option<Duration>,
    pub completed_steps: usize,
    pub failed_steps: usize,
    /// Completed steps over total steps; 0 with no steps.
    pub success_ratio: f64,
}

impl OperationView {
    pub fn new(operation: RestoreOperation) -> Self {
        let completed_steps = operation.count_steps(StepStatus::Completed);
        let failed_steps = operation.count_steps(StepStatus::Failed);
        let total = operation.steps.len();
        let success_ratio = if total == 0 {
            0.0
        } else {
            completed_steps as f64 / total as f64
        };
        let duration = operation.ended_at.map(|end| end - operation.started_at);

        Self {
            operation,
            duration,
            completed_steps,
            failed_steps,
            success_ratio,
        }
    }

    /// Time spent so far, or the final duration.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        self.duration
            .unwrap_or_else(|| now - self.operation.started_at)
    }

    pub fn summary(&self) -> OperationSummary {
        OperationSummary::from_operation(&self.operation)
    }
}

/// Read-only query interface over recorded operations.
#[derive(Debug, Clone)]
pub struct StatusQuery {
    recorder: OutcomeRecorder,
}

impl StatusQuery {
    pub fn new(recorder: OutcomeRecorder) -> Self {
        Self { recorder }
    }

    pub fn get(&self, operation_id: &str) -> Result<OperationView> {
        Ok(OperationView::new(self.recorder.get(operation_id)?))
    }

    /// Most recent first.
    pub fn list(&self, limit: usize) -> Result<Vec<OperationView>> {
        Ok(self
            .recorder
            .list(limit)?
            .into_iter()
            .map(OperationView::new)
            .collect())
    }

    /// The live operation, if the most recent one is not terminal.
    pub fn in_flight(&self) -> Result<Option<OperationView>> {
        Ok(self
            .recorder
            .list(usize::MAX)?
            .into_iter()
            .find(|op| !op.is_terminal())
            .map(OperationView::new))
    }
}

/// `1h02m03s` style rendering.
pub fn format_duration(d: Duration) -> String {
    let secs = d.num_seconds().max(0);
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}h{:02}m{:02}s", h, m, s)
    } else if m > 0 {
        format!("{}m{:02}s", m, s)
    } else {
        format!("{}s", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::operation::{OperationStatus, RestoreMode, StepName, StepRecord};
    use tempfile::TempDir;

    fn step(name: StepName, status: StepStatus) -> StepRecord {
        let mut step = StepRecord::running(name);
        step.status = status;
        step
    }

    #[test]
    fn test_derived_fields() {
        let mut op = RestoreOperation::new("b1.tar", RestoreMode::Full, true);
        op.steps = vec![
            step(StepName::Preflight, StepStatus::Completed),
            step(StepName::PrepareEnvironment, StepStatus::Completed),
            step(StepName::ExecuteRestore, StepStatus::Failed),
            step(StepName::Rollback, StepStatus::Completed),
        ];
        op.status = OperationStatus::RolledBack;
        op.ended_at = Some(op.started_at + Duration::seconds(90));

        let view = OperationView::new(op);
        assert_eq!(view.duration, Some(Duration::seconds(90)));
        assert_eq!(view.completed_steps, 3);
        assert_eq!(view.failed_steps, 1);
        assert!((view.success_ratio - 0.75).abs() < f64::EPSILON);
        assert_eq!(view.summary().total_steps, 4);
    }

    #[test]
    fn test_live_operation_has_no_duration() {
        let op = RestoreOperation::new("b1.tar", RestoreMode::Full, true);
        let started = op.started_at;
        let view = OperationView::new(op);
        assert!(view.duration.is_none());
        assert_eq!(view.success_ratio, 0.0);
        assert_eq!(
            view.elapsed(started + Duration::seconds(5)),
            Duration::seconds(5)
        );
    }

    #[test]
    fn test_query_does_not_mutate() {
        let temp_dir = TempDir::new().unwrap();
        let recorder = OutcomeRecorder::new(temp_dir.path());
        let op = RestoreOperation::new("b1.tar", RestoreMode::ConfigOnly, true);
        recorder.create(&op).unwrap();

        let query = StatusQuery::new(recorder.clone());
        let view = query.get(&op.id).unwrap();
        assert_eq!(view.operation, op);
        assert_eq!(query.list(10).unwrap().len(), 1);
        assert_eq!(query.in_flight().unwrap().unwrap().operation.id, op.id);
        assert_eq!(recorder.get(&op.id).unwrap(), op);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::seconds(5)), "5s");
        assert_eq!(format_duration(Duration::seconds(125)), "2m05s");
        assert_eq!(format_duration(Duration::seconds(3723)), "1h02m03s");
    }
}
