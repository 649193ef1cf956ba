//! Error types for the restore orchestrator.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the restore orchestrator.
#[derive(Error, Debug)]
pub enum Error {
    // Submission errors
    #[error("Invalid restore mode: {0} (expected full, database_only, volumes_only, config_only or disaster_recovery)")]
    InvalidMode(String),

    #[error("Another restore operation is in progress: {0}")]
    OperationInProgress(String),

    // Recorder errors
    #[error("Operation already finalized: {0}")]
    AlreadyFinalized(String),

    #[error("Operation not found: {0}")]
    OperationNotFound(String),

    #[error("Illegal status transition for {operation_id}: {from} -> {to}")]
    IllegalTransition {
        operation_id: String,
        from: String,
        to: String,
    },

    #[error("Step conflict: {0}")]
    StepConflict(String),

    // Preflight errors
    #[error("Backup not reachable: {0}")]
    BackupUnreachable(String),

    #[error("Insufficient scratch space: {available} bytes available, {required} bytes required")]
    InsufficientSpace { available: u64, required: u64 },

    #[error("Backup checksum mismatch: {0}")]
    ChecksumMismatch(String),

    // Rollback errors
    #[error("No rollback snapshot recorded for operation: {0}")]
    SnapshotMissing(String),

    // Config errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // HTTP errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // TOML errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a generic error from a string.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Error::Other(msg.into())
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidMode(_) => "INVALID_MODE",
            Error::OperationInProgress(_) => "OPERATION_IN_PROGRESS",
            Error::AlreadyFinalized(_) => "ALREADY_FINALIZED",
            Error::OperationNotFound(_) => "OPERATION_NOT_FOUND",
            Error::IllegalTransition { .. } => "ILLEGAL_TRANSITION",
            Error::StepConflict(_) => "STEP_CONFLICT",
            Error::BackupUnreachable(_) => "BACKUP_UNREACHABLE",
            Error::InsufficientSpace { .. } => "INSUFFICIENT_SPACE",
            Error::ChecksumMismatch(_) => "CHECKSUM_MISMATCH",
            Error::SnapshotMissing(_) => "SNAPSHOT_MISSING",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::Io(_) => "IO_ERROR",
            Error::Http(_) => "HTTP_ERROR",
            Error::Json(_) => "JSON_ERROR",
            Error::Toml(_) => "TOML_ERROR",
            Error::Other(_) => "ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::InvalidMode("x".into()).code(), "INVALID_MODE");
        assert_eq!(
            Error::OperationInProgress("op-1".into()).code(),
            "OPERATION_IN_PROGRESS"
        );
        assert_eq!(
            Error::AlreadyFinalized("op-1".into()).code(),
            "ALREADY_FINALIZED"
        );
    }

    #[test]
    fn test_insufficient_space_message() {
        let err = Error::InsufficientSpace {
            available: 10,
            required: 20,
        };
        assert!(err.to_string().contains("10 bytes available"));
    }
}
