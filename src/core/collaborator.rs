//! External stage collaborators.
//!
//! Every stage delegates its real work to an opaque collaborator that reports
//! only success or failure plus diagnostic text. The stock implementation runs
//! a configured command; tests plug in scripted ones.

use crate::models::config::CommandConfig;
use crate::models::operation::{RestoreMode, StepName};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

/// Most diagnostic output kept from a command.
const MAX_DETAILS_BYTES: usize = 4096;

/// What a collaborator is asked to do.
#[derive(Debug, Clone)]
pub struct StageRequest {
    pub operation_id: String,
    pub backup_reference: String,
    pub mode: RestoreMode,
    pub stage: StepName,
    /// Budget the orchestrator enforces around the call.
    pub timeout: Duration,
    /// Per-operation scratch directory.
    pub work_dir: PathBuf,
}

/// What a collaborator reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome {
    pub success: bool,
    pub details: String,
}

impl StageOutcome {
    pub fn ok(details: &str) -> Self {
        Self {
            success: true,
            details: details.to_string(),
        }
    }

    pub fn fail(details: &str) -> Self {
        Self {
            success: false,
            details: details.to_string(),
        }
    }
}

/// An opaque unit of work behind one pipeline stage.
#[async_trait]
pub trait StageCollaborator: Send + Sync {
    async fn invoke(&self, request: &StageRequest) -> StageOutcome;
}

/// Stand-in for a stage with no command configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct SkippedCollaborator;

#[async_trait]
impl StageCollaborator for SkippedCollaborator {
    async fn invoke(&self, request: &StageRequest) -> StageOutcome {
        tracing::debug!("{}: no command configured for {}", request.operation_id, request.stage);
        StageOutcome::ok("skipped: no command configured")
    }
}

/// Runs an external command; exit status 0 is success.
#[derive(Debug, Clone)]
pub struct CommandCollaborator {
    argv: Vec<String>,
    env: Vec<(String, String)>,
}

impl CommandCollaborator {
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            env: Vec::new(),
        }
    }

    /// Add an environment variable passed to every invocation.
    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }
}

#[async_trait]
impl StageCollaborator for CommandCollaborator {
    async fn invoke(&self, request: &StageRequest) -> StageOutcome {
        let Some((program, args)) = self.argv.split_first() else {
            return StageOutcome::fail("empty command");
        };

        tracing::debug!(
            "{}: {} running {} {:?}",
            request.operation_id,
            request.stage,
            program,
            args
        );

        // kill_on_drop: an abandoned (timed out or cancelled) call takes the child with it.
        let output = Command::new(program)
            .args(args)
            .env("RESTORE_OPERATION_ID", &request.operation_id)
            .env("RESTORE_BACKUP_REFERENCE", &request.backup_reference)
            .env("RESTORE_MODE", request.mode.as_str())
            .env("RESTORE_STAGE", request.stage.as_str())
            .env("RESTORE_WORK_DIR", &request.work_dir)
            .env("RESTORE_TIMEOUT_SECS", request.timeout.as_secs().to_string())
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .kill_on_drop(true)
            .output()
            .await;

        match output {
            Ok(output) => {
                let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                text.push_str(&String::from_utf8_lossy(&output.stderr));
                let details = tail(text.trim(), MAX_DETAILS_BYTES);
                if output.status.success() {
                    StageOutcome::ok(&details)
                } else {
                    StageOutcome::fail(&format!("{} exited with {}: {}", program, output.status, details))
                }
            }
            Err(e) => StageOutcome::fail(&format!("failed to start {}: {}", program, e)),
        }
    }
}

/// Last `max` bytes of `text`, cut on a char boundary.
fn tail(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &text[start..])
}

/// Collaborator for a configured command, or a skip when none is set.
pub fn collaborator_for(argv: &[String]) -> Arc<dyn StageCollaborator> {
    if argv.is_empty() {
        Arc::new(SkippedCollaborator)
    } else {
        Arc::new(CommandCollaborator::new(argv.to_vec()))
    }
}

/// The collaborators behind each non-rollback stage.
#[derive(Clone)]
pub struct Collaborators {
    pub backup_validator: Arc<dyn StageCollaborator>,
    pub restore_executor: Arc<dyn StageCollaborator>,
    pub restore_validator: Arc<dyn StageCollaborator>,
    pub health_prober: Arc<dyn StageCollaborator>,
    pub cleanup: Arc<dyn StageCollaborator>,
}

impl Collaborators {
    pub fn from_config(commands: &CommandConfig) -> Self {
        Self {
            backup_validator: collaborator_for(&commands.validate_backup),
            restore_executor: collaborator_for(&commands.execute_restore),
            restore_validator: collaborator_for(&commands.validate_restore),
            health_prober: collaborator_for(&commands.health_probe),
            cleanup: collaborator_for(&commands.cleanup),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> StageRequest {
        StageRequest {
            operation_id: "restore_test".to_string(),
            backup_reference: "b1.tar".to_string(),
            mode: RestoreMode::Full,
            stage: StepName::ExecuteRestore,
            timeout: Duration::from_secs(5),
            work_dir: std::env::temp_dir(),
        }
    }

    #[test]
    fn test_tail_keeps_end() {
        assert_eq!(tail("abcdef", 10), "abcdef");
        assert_eq!(tail("abcdef", 3), "...def");
        // multi-byte chars are never split
        assert_eq!(tail("ééé", 3), "...é");
    }

    #[tokio::test]
    async fn test_skipped_collaborator_succeeds() {
        let outcome = collaborator_for(&[]).invoke(&request()).await;
        assert!(outcome.success);
        assert!(outcome.details.contains("skipped"));
    }

    #[tokio::test]
    async fn test_missing_program_fails() {
        let collaborator =
            CommandCollaborator::new(vec!["/nonexistent/restore-tool".to_string()]);
        let outcome = collaborator.invoke(&request()).await;
        assert!(!outcome.success);
        assert!(outcome.details.contains("failed to start"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_sees_request_env() {
        let collaborator = CommandCollaborator::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo $RESTORE_MODE $RESTORE_STAGE $EXTRA".to_string(),
        ])
        .with_env("EXTRA", "x");
        let outcome = collaborator.invoke(&request()).await;
        assert!(outcome.success);
        assert_eq!(outcome.details, "full execute_restore x");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_fails() {
        let collaborator = CommandCollaborator::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo pg_restore failed >&2; exit 3".to_string(),
        ]);
        let outcome = collaborator.invoke(&request()).await;
        assert!(!outcome.success);
        assert!(outcome.details.contains("pg_restore failed"));
    }
}
