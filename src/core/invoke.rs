//! Timeout- and cancellation-bounded collaborator calls.

use crate::core::collaborator::StageOutcome;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Why a bounded call did not succeed.
///
/// The pipeline treats all three alike; they stay distinct for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageFailure {
    /// The collaborator reported failure.
    Failed(String),
    /// The budget ran out first. The collaborator's eventual result is ignored.
    TimedOut(Duration),
    /// An operator asked the operation to stop.
    Cancelled,
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageFailure::Failed(details) => write!(f, "failed: {}", details),
            StageFailure::TimedOut(d) => write!(f, "timed out after {}s", d.as_secs()),
            StageFailure::Cancelled => write!(f, "cancelled by operator"),
        }
    }
}

/// Success details, or why the call fell short.
pub type Invocation = std::result::Result<String, StageFailure>;

/// Await `call`, giving up when `timeout` expires or `cancel` fires.
pub async fn bounded<F>(call: F, timeout: Duration, cancel: &CancellationToken) -> Invocation
where
    F: Future<Output = StageOutcome>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StageFailure::Cancelled),
        result = tokio::time::timeout(timeout, call) => match result {
            Ok(outcome) if outcome.success => Ok(outcome.details),
            Ok(outcome) => Err(StageFailure::Failed(outcome.details)),
            Err(_) => Err(StageFailure::TimedOut(timeout)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_success_and_failure_pass_through() {
        let cancel = CancellationToken::new();
        let ok = bounded(async { StageOutcome::ok("done") }, Duration::from_secs(1), &cancel).await;
        assert_eq!(ok, Ok("done".to_string()));

        let failed =
            bounded(async { StageOutcome::fail("bad") }, Duration::from_secs(1), &cancel).await;
        assert_eq!(failed, Err(StageFailure::Failed("bad".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_distinct() {
        let cancel = CancellationToken::new();
        let result = bounded(
            async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                StageOutcome::ok("too late")
            },
            Duration::from_secs(60),
            &cancel,
        )
        .await;
        assert_eq!(result, Err(StageFailure::TimedOut(Duration::from_secs(60))));
        assert_eq!(
            result.unwrap_err().to_string(),
            "timed out after 60s"
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_call() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = bounded(async { StageOutcome::ok("ran") }, Duration::from_secs(1), &cancel).await;
        assert_eq!(result, Err(StageFailure::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_mid_call() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let result = bounded(
            async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                StageOutcome::ok("too late")
            },
            Duration::from_secs(60),
            &cancel,
        )
        .await;
        assert_eq!(result, Err(StageFailure::Cancelled));
    }
}
