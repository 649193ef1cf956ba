//! Scratch space preflight check.

use super::CheckResult;
use crate::utils::fs as fsutil;
use crate::Result;
use std::path::Path;

/// Extraction needs this many times the compressed backup size.
pub const SPACE_MULTIPLIER: u64 = 2;

/// Source of free-space figures.
pub trait SpaceProbe: Send + Sync {
    /// Free bytes on the filesystem holding `path`.
    fn available(&self, path: &Path) -> Result<u64>;
}

/// Reads free space from the mounted disks.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSpaceProbe;

impl SpaceProbe for SystemSpaceProbe {
    fn available(&self, path: &Path) -> Result<u64> {
        fsutil::available_space(path)
    }
}

/// Check that `scratch_dir` can hold an extraction of a backup of `backup_size` bytes.
pub fn check(scratch_dir: &Path, backup_size: u64, probe: &dyn SpaceProbe) -> CheckResult {
    let required = backup_size.saturating_mul(SPACE_MULTIPLIER);

    match probe.available(scratch_dir) {
        Ok(available) if available >= required => CheckResult::ok(
            "disk_space",
            &format!("{} bytes free, {} required", available, required),
        ),
        Ok(available) => CheckResult::fail(
            "disk_space",
            &crate::Error::InsufficientSpace {
                available,
                required,
            }
            .to_string(),
            &format!("Free space under {}", scratch_dir.display()),
        ),
        Err(e) => CheckResult::fail(
            "disk_space",
            &format!("cannot determine free space ({})", e),
            &format!("Check that {} is on a mounted filesystem", scratch_dir.display()),
        ),
    }
}
