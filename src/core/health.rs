//! Post-restore health polling.
//!
//! The health stage is a retry budget, not a single timeout: up to `attempts`
//! probes, each bounded by `probe_timeout`, spaced by a fixed `interval`.

use crate::core::collaborator::{StageCollaborator, StageRequest};
use crate::core::invoke::{self, Invocation, StageFailure};
use crate::models::config::HealthConfig;
use tokio_util::sync::CancellationToken;

/// Probe until healthy or the attempt budget is spent.
pub async fn poll(
    prober: &dyn StageCollaborator,
    request: &StageRequest,
    health: &HealthConfig,
    cancel: &CancellationToken,
) -> Invocation {
    let attempts = health.attempts.max(1);
    let mut last = String::new();

    for attempt in 1..=attempts {
        match invoke::bounded(prober.invoke(request), health.probe_timeout(), cancel).await {
            Ok(details) => {
                tracing::info!(
                    "{}: healthy after {}/{} attempts",
                    request.operation_id,
                    attempt,
                    attempts
                );
                return Ok(format!("healthy after {}/{} attempts: {}", attempt, attempts, details));
            }
            Err(StageFailure::Cancelled) => return Err(StageFailure::Cancelled),
            Err(failure) => {
                tracing::debug!(
                    "{}: health probe {}/{} {}",
                    request.operation_id,
                    attempt,
                    attempts,
                    failure
                );
                last = failure.to_string();
            }
        }

        if attempt < attempts {
            tokio::select! {
                _ = cancel.cancelled() => return Err(StageFailure::Cancelled),
                _ = tokio::time::sleep(health.interval()) => {}
            }
        }
    }

    Err(StageFailure::Failed(format!(
        "unhealthy after {} attempts; last probe {}",
        attempts, last
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::collaborator::StageOutcome;
    use crate::models::operation::{RestoreMode, StepName};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Healthy from the `healthy_from`-th probe on.
    struct Prober {
        calls: AtomicU32,
        healthy_from: u32,
    }

    #[async_trait]
    impl StageCollaborator for Prober {
        async fn invoke(&self, _request: &StageRequest) -> StageOutcome {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= self.healthy_from {
                StageOutcome::ok("200 OK")
            } else {
                StageOutcome::fail("connection refused")
            }
        }
    }

    fn request() -> StageRequest {
        StageRequest {
            operation_id: "restore_test".to_string(),
            backup_reference: "b1.tar".to_string(),
            mode: RestoreMode::Full,
            stage: StepName::HealthCheck,
            timeout: Duration::from_secs(300),
            work_dir: std::env::temp_dir(),
        }
    }

    fn budget(attempts: u32) -> HealthConfig {
        HealthConfig {
            attempts,
            interval_secs: 10,
            probe_timeout_secs: 5,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_healthy_within_budget() {
        let prober = Prober {
            calls: AtomicU32::new(0),
            healthy_from: 3,
        };
        let result = poll(&prober, &request(), &budget(5), &CancellationToken::new()).await;
        assert!(result.unwrap().starts_with("healthy after 3/5"));
        assert_eq!(prober.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_budget_fails() {
        let prober = Prober {
            calls: AtomicU32::new(0),
            healthy_from: u32::MAX,
        };
        let result = poll(&prober, &request(), &budget(4), &CancellationToken::new()).await;
        match result {
            Err(StageFailure::Failed(details)) => {
                assert!(details.contains("unhealthy after 4 attempts"));
                assert!(details.contains("connection refused"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(prober.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_polling() {
        let prober = Prober {
            calls: AtomicU32::new(0),
            healthy_from: u32::MAX,
        };
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(15)).await;
            trigger.cancel();
        });

        let result = poll(&prober, &request(), &budget(30), &cancel).await;
        assert_eq!(result, Err(StageFailure::Cancelled));
        assert_eq!(prober.calls.load(Ordering::SeqCst), 2);
    }
}
