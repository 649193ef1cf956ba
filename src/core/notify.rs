//! Terminal status notifications.
//!
//! Delivery failures are logged and never change the restore result.

use crate::models::config::NotifyConfig;
use crate::models::operation::{OperationStatus, RestoreOperation};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// What the dispatcher receives at finalize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub operation_id: String,
    pub status: OperationStatus,
    pub message: String,
}

impl Notification {
    pub fn for_operation(op: &RestoreOperation) -> Self {
        let failed = op.failed_stage().map(|s| s.name.as_str()).unwrap_or("unknown");
        let message = match op.status {
            OperationStatus::Completed => format!(
                "Restore of {} ({}) completed",
                op.backup_reference, op.mode
            ),
            OperationStatus::RolledBack => format!(
                "Restore of {} failed at {}; previous state restored from snapshot",
                op.backup_reference, failed
            ),
            OperationStatus::Failed if op.rollback_failed() => format!(
                "Restore of {} failed at {} and rollback failed; manual intervention required",
                op.backup_reference, failed
            ),
            _ => format!("Restore of {} failed at {}", op.backup_reference, failed),
        };

        Self {
            operation_id: op.id.clone(),
            status: op.status,
            message,
        }
    }
}

/// Receives terminal statuses.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        match notification.status {
            OperationStatus::Completed => tracing::info!(
                "[{}] {}: {}",
                notification.status,
                notification.operation_id,
                notification.message
            ),
            _ => tracing::warn!(
                "[{}] {}: {}",
                notification.status,
                notification.operation_id,
                notification.message
            ),
        }
        Ok(())
    }
}

/// POSTs notifications as JSON.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        self.client
            .post(&self.url)
            .json(notification)
            .send()
            .await?
            .error_for_status()?;
        tracing::debug!("Notification for {} delivered", notification.operation_id);
        Ok(())
    }
}

/// Notifier for the given configuration.
pub fn from_config(config: &NotifyConfig) -> Result<Arc<dyn Notifier>> {
    match config.webhook_url.as_deref() {
        Some(url) if !url.is_empty() => Ok(Arc::new(WebhookNotifier::new(
            url,
            Duration::from_secs(config.timeout_secs),
        )?)),
        _ => Ok(Arc::new(LogNotifier)),
    }
}

/// Deliver, logging instead of failing.
pub async fn dispatch(notifier: &dyn Notifier, notification: &Notification) {
    if let Err(e) = notifier.notify(notification).await {
        tracing::warn!(
            "Notification for {} not delivered: {}",
            notification.operation_id,
            e
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::operation::{RestoreMode, StepName, StepRecord, StepStatus};

    fn failed_step(name: StepName) -> StepRecord {
        let mut step = StepRecord::running(name);
        step.status = StepStatus::Failed;
        step
    }

    #[test]
    fn test_message_names_failed_stage() {
        let mut op = RestoreOperation::new("b1.tar", RestoreMode::Full, true);
        op.steps = vec![failed_step(StepName::ExecuteRestore)];
        op.status = OperationStatus::Failed;

        let n = Notification::for_operation(&op);
        assert!(n.message.contains("execute_restore"));
        assert!(!n.message.contains("manual intervention"));
    }

    #[test]
    fn test_message_flags_rollback_failure() {
        let mut op = RestoreOperation::new("b1.tar", RestoreMode::Full, true);
        op.steps = vec![
            failed_step(StepName::ExecuteRestore),
            failed_step(StepName::Rollback),
        ];
        op.status = OperationStatus::Failed;

        let n = Notification::for_operation(&op);
        assert!(n.message.contains("manual intervention required"));
    }

    struct Refusing;

    #[async_trait]
    impl Notifier for Refusing {
        async fn notify(&self, _notification: &Notification) -> Result<()> {
            Err(crate::Error::other("connection refused"))
        }
    }

    #[tokio::test]
    async fn test_dispatch_swallows_delivery_failure() {
        let op = RestoreOperation::new("b1.tar", RestoreMode::Full, true);
        dispatch(&Refusing, &Notification::for_operation(&op)).await;
    }

    #[test]
    fn test_from_config_defaults_to_log() {
        assert!(from_config(&NotifyConfig::default()).is_ok());
    }
}
