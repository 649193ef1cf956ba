//! Configuration model.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the outcome records and the single-flight lock.
    pub state_dir: PathBuf,
    /// Extraction workspace. Overrides `<state_dir>/scratch`.
    pub scratch_dir: Option<PathBuf>,
    /// Parent of rollback snapshot locations. Overrides `<state_dir>/snapshots`.
    pub snapshot_dir: Option<PathBuf>,
    /// Replay the snapshot when a stage fails.
    pub rollback_on_failure: bool,
    /// Stage timeouts.
    pub timeouts: TimeoutConfig,
    /// Health check polling.
    pub health: HealthConfig,
    /// External collaborator commands.
    pub commands: CommandConfig,
    /// Terminal status notification.
    pub notify: NotifyConfig,
}

/// Stage timeouts in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub preflight: u64,
    pub snapshot: u64,
    pub execute_restore: u64,
    pub validate_restore: u64,
    pub cleanup: u64,
    pub replay: u64,
}

/// Health check polling budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Maximum probe attempts.
    pub attempts: u32,
    /// Fixed delay between attempts, in seconds.
    pub interval_secs: u64,
    /// Timeout for a single probe, in seconds.
    pub probe_timeout_secs: u64,
}

/// Argument vectors for the external collaborators. Empty means not configured.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub validate_backup: Vec<String>,
    pub capture_snapshot: Vec<String>,
    pub execute_restore: Vec<String>,
    pub validate_restore: Vec<String>,
    pub health_probe: Vec<String>,
    pub cleanup: Vec<String>,
    pub replay_database: Vec<String>,
    pub replay_volumes: Vec<String>,
}

/// Notification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Webhook receiving `{operation_id, status, message}` as JSON.
    pub webhook_url: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            scratch_dir: None,
            snapshot_dir: None,
            rollback_on_failure: true,
            timeouts: TimeoutConfig::default(),
            health: HealthConfig::default(),
            commands: CommandConfig::default(),
            notify: NotifyConfig::default(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            preflight: 300,
            snapshot: 1800,
            execute_restore: 3600,
            validate_restore: 600,
            cleanup: 300,
            replay: 3600,
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            attempts: 30,
            interval_secs: 10,
            probe_timeout_secs: 10,
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: 10,
        }
    }
}

impl Config {
    /// Config rooted at `state_dir`, everything else default.
    pub fn with_state_dir(state_dir: &Path) -> Self {
        Self {
            state_dir: state_dir.to_path_buf(),
            ..Self::default()
        }
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(|| self.state_dir.join("scratch"))
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        self.snapshot_dir
            .clone()
            .unwrap_or_else(|| self.state_dir.join("snapshots"))
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.health.attempts == 0 {
            return Err(crate::Error::InvalidConfig(
                "health.attempts must be at least 1".to_string(),
            ));
        }
        let t = &self.timeouts;
        for (name, secs) in [
            ("preflight", t.preflight),
            ("snapshot", t.snapshot),
            ("execute_restore", t.execute_restore),
            ("validate_restore", t.validate_restore),
            ("cleanup", t.cleanup),
            ("replay", t.replay),
        ] {
            if secs == 0 {
                return Err(crate::Error::InvalidConfig(format!(
                    "timeouts.{} must be greater than zero",
                    name
                )));
            }
        }
        Ok(())
    }
}

impl TimeoutConfig {
    pub fn preflight(&self) -> Duration {
        Duration::from_secs(self.preflight)
    }

    pub fn snapshot(&self) -> Duration {
        Duration::from_secs(self.snapshot)
    }

    pub fn execute_restore(&self) -> Duration {
        Duration::from_secs(self.execute_restore)
    }

    pub fn validate_restore(&self) -> Duration {
        Duration::from_secs(self.validate_restore)
    }

    pub fn cleanup(&self) -> Duration {
        Duration::from_secs(self.cleanup)
    }

    pub fn replay(&self) -> Duration {
        Duration::from_secs(self.replay)
    }
}

impl HealthConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

/// Get the configuration directory path.
fn dirs_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("restore_orchestrator")
}

fn default_state_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("restore_orchestrator")
}

/// Default config file location.
pub fn default_config_path() -> PathBuf {
    dirs_config_path().join("config.toml")
}

/// Load configuration from file.
///
/// A missing file yields the defaults; a malformed one is an error.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config_path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(default_config_path);

    if !config_path.exists() {
        tracing::debug!("No config at {:?}, using defaults", config_path);
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(&config_path)?;
    let config: Config = toml::from_str(&content).map_err(|e| {
        crate::Error::InvalidConfig(format!("{}: {}", config_path.display(), e))
    })?;
    config.validate()?;

    tracing::debug!("Loaded config from {:?}", config_path);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert!(config.rollback_on_failure);
        assert_eq!(config.timeouts.execute_restore, 3600);
        assert_eq!(config.health.attempts, 30);
        assert!(config.commands.execute_restore.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_derived_dirs() {
        let config = Config::with_state_dir(Path::new("/var/lib/restore"));
        assert_eq!(config.scratch_dir(), PathBuf::from("/var/lib/restore/scratch"));
        assert_eq!(
            config.snapshot_dir(),
            PathBuf::from("/var/lib/restore/snapshots")
        );
    }

    #[test]
    fn test_load_partial_toml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
state_dir = "/srv/restore"
rollback_on_failure = false

[timeouts]
execute_restore = 7200

[health]
attempts = 5

[commands]
execute_restore = ["/usr/local/bin/restore-db", "--all"]
"#,
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.state_dir, PathBuf::from("/srv/restore"));
        assert!(!config.rollback_on_failure);
        assert_eq!(config.timeouts.execute_restore, 7200);
        assert_eq!(config.timeouts.validate_restore, 600);
        assert_eq!(config.health.attempts, 5);
        assert_eq!(config.health.interval_secs, 10);
        assert_eq!(config.commands.execute_restore.len(), 2);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = load_config(Some(&temp_dir.path().join("absent.toml"))).unwrap();
        assert!(config.rollback_on_failure);
    }

    #[test]
    fn test_load_invalid_toml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "rollback_on_failure = \"maybe\"").unwrap();

        let err = load_config(Some(&path)).unwrap_err();
        assert_eq!(err.code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut config = Config::default();
        config.health.attempts = 0;
        assert!(config.validate().is_err());
    }
}
