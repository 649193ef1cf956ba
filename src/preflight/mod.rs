//! Preflight checks module.
//!
//! Local checks that run before the backup validator collaborator. They exist
//! to fail fast on restores that cannot succeed: an unreachable or corrupt
//! archive, or a scratch filesystem too small to extract it.

pub mod backup;
pub mod disk;

use backup::BackupLocation;
use colored::Colorize;
use disk::SpaceProbe;
use std::path::Path;

/// Result of a preflight check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub success: bool,
    pub message: String,
    pub hint: Option<String>,
}

impl CheckResult {
    pub fn ok(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            success: true,
            message: message.to_string(),
            hint: None,
        }
    }

    pub fn fail(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            success: false,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    /// One-line form used in step details.
    pub fn line(&self) -> String {
        let tag = if self.success { "ok" } else { "fail" };
        format!("[{}] {}: {}", tag, self.name, self.message)
    }
}

/// Run the local checks in order, stopping at the first failure.
pub fn run_local_checks(
    backup_reference: &str,
    scratch_dir: &Path,
    probe: &dyn SpaceProbe,
) -> Vec<CheckResult> {
    let mut results = Vec::new();

    let path = match BackupLocation::parse(backup_reference) {
        BackupLocation::Local(path) => path,
        BackupLocation::Remote(uri) => {
            results.push(CheckResult::ok(
                "backup",
                &format!("remote reference {}, left to the backup validator", uri),
            ));
            return results;
        }
    };

    let (reachable, size) = backup::check_reachable(&path);
    results.push(reachable);
    let Some(size) = size else {
        return results;
    };

    let checksum = backup::check_checksum(&path);
    let checksum_ok = checksum.success;
    results.push(checksum);
    if !checksum_ok {
        return results;
    }

    results.push(disk::check(scratch_dir, size, probe));
    results
}

/// Print preflight check results.
pub fn print_results(results: &[CheckResult]) {
    for result in results {
        if result.success {
            println!(
                "{} {}: {}",
                "[OK]".green(),
                result.name.bold(),
                result.message
            );
        } else {
            println!(
                "{} {}: {}",
                "[FAIL]".red(),
                result.name.bold(),
                result.message
            );
            if let Some(ref hint) = result.hint {
                println!("  {} {}", "->".yellow(), hint);
            }
        }
    }
}

/// Check if all preflight checks passed.
pub fn all_passed(results: &[CheckResult]) -> bool {
    results.iter().all(|r| r.success)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Result;
    use std::fs;
    use tempfile::TempDir;

    struct Fixed(u64);

    impl SpaceProbe for Fixed {
        fn available(&self, _path: &Path) -> Result<u64> {
            Ok(self.0)
        }
    }

    #[test]
    fn test_unreachable_stops_early() {
        let results = run_local_checks("/nonexistent/b1.tar", Path::new("/tmp"), &Fixed(u64::MAX));
        assert_eq!(results.len(), 1);
        assert!(!all_passed(&results));
    }

    #[test]
    fn test_all_local_checks_pass() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("b1.tar");
        fs::write(&archive, vec![0u8; 64]).unwrap();

        let results = run_local_checks(archive.to_str().unwrap(), temp_dir.path(), &Fixed(128));
        assert_eq!(results.len(), 3);
        assert!(all_passed(&results));
    }

    #[test]
    fn test_insufficient_space() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("b1.tar");
        fs::write(&archive, vec![0u8; 64]).unwrap();

        let results = run_local_checks(archive.to_str().unwrap(), temp_dir.path(), &Fixed(127));
        assert!(!all_passed(&results));
        assert_eq!(results.last().unwrap().name, "disk_space");
    }

    #[test]
    fn test_remote_reference_skips_local_checks() {
        let results = run_local_checks("s3://bucket/b1.tar", Path::new("/tmp"), &Fixed(0));
        assert!(all_passed(&results));
        assert_eq!(results.len(), 1);
    }
}
