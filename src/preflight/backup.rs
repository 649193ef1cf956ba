//! Backup reachability and checksum checks.

use super::CheckResult;
use crate::utils::{fs as fsutil, hash};
use std::fs;
use std::path::{Path, PathBuf};

/// Where a backup reference points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupLocation {
    /// A path on a local (or locally mounted) filesystem.
    Local(PathBuf),
    /// A URI only the backup validator collaborator can reach.
    Remote(String),
}

impl BackupLocation {
    pub fn parse(reference: &str) -> Self {
        if let Some(path) = reference.strip_prefix("file://") {
            return BackupLocation::Local(PathBuf::from(path));
        }
        if reference.contains("://") {
            return BackupLocation::Remote(reference.to_string());
        }
        BackupLocation::Local(PathBuf::from(reference))
    }
}

/// Check that the backup exists and is readable; returns its size on success.
pub fn check_reachable(path: &Path) -> (CheckResult, Option<u64>) {
    let readable = if path.is_dir() {
        fs::read_dir(path).map(|_| ())
    } else {
        fs::File::open(path).map(|_| ())
    };

    if let Err(e) = readable {
        return (
            CheckResult::fail(
                "backup",
                &format!("{} not reachable ({})", path.display(), e),
                "Check the backup path and its permissions",
            ),
            None,
        );
    }

    match fsutil::path_size(path) {
        Ok(size) => (
            CheckResult::ok("backup", &format!("{} ({} bytes)", path.display(), size)),
            Some(size),
        ),
        Err(e) => (
            CheckResult::fail(
                "backup",
                &format!("cannot size {} ({})", path.display(), e),
                "Check the backup path and its permissions",
            ),
            None,
        ),
    }
}

/// Path of the optional `<backup>.sha256` sidecar.
pub fn checksum_sidecar(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".sha256");
    path.with_file_name(name)
}

/// Verify the archive against its sidecar checksum, if there is one.
pub fn check_checksum(path: &Path) -> CheckResult {
    let sidecar = checksum_sidecar(path);
    if !sidecar.exists() {
        return CheckResult::ok("checksum", "no sidecar, skipped");
    }
    if path.is_dir() {
        return CheckResult::ok("checksum", "directory backup, skipped");
    }

    let expected = match fs::read_to_string(&sidecar) {
        Ok(content) => content
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_lowercase(),
        Err(e) => {
            return CheckResult::fail(
                "checksum",
                &format!("cannot read {} ({})", sidecar.display(), e),
                "Regenerate the checksum file",
            )
        }
    };

    match hash::sha256_file(path) {
        Ok(actual) if actual == expected => CheckResult::ok("checksum", "sha256 verified"),
        Ok(actual) => CheckResult::fail(
            "checksum",
            &crate::Error::ChecksumMismatch(format!(
                "{}: sha256 expected {}, got {}",
                path.display(),
                expected,
                actual
            ))
            .to_string(),
            "The archive is corrupt or incomplete; copy it again",
        ),
        Err(e) => CheckResult::fail(
            "checksum",
            &format!("cannot hash archive ({})", e),
            "Check the backup path and its permissions",
        ),
    }
}
