//! Single-flight restore lock.
//!
//! A lock file created with `create_new`, holding the owner's operation id and
//! process id. Held from submit until finalize; at most one restore runs
//! system-wide.

use crate::Result;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "restore.lock";

/// Contents of a held lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockInfo {
    pub holder: String,
    pub pid: Option<u32>,
}

impl LockInfo {
    fn parse(content: &str) -> Self {
        let mut lines = content.lines();
        let holder = lines.next().unwrap_or_default().trim().to_string();
        let pid = lines.next().and_then(|l| l.trim().parse().ok());
        Self { holder, pid }
    }

    /// Whether the owning process is still running.
    pub fn owner_alive(&self) -> bool {
        use sysinfo::{Pid, System};

        let Some(pid) = self.pid else {
            return false;
        };
        if pid == std::process::id() {
            return true;
        }
        let mut system = System::new();
        system.refresh_process(Pid::from_u32(pid))
    }
}

/// Exclusive restore lock. Released on `release` or drop.
#[derive(Debug)]
pub struct RestoreLock {
    path: PathBuf,
    holder: String,
    released: bool,
}

impl RestoreLock {
    /// Take the lock for `holder`, or fail with `OperationInProgress`.
    pub fn acquire(state_dir: &Path, holder: &str) -> Result<Self> {
        fs::create_dir_all(state_dir)?;
        let path = lock_path(state_dir);

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let current = read(state_dir)
                    .map(|info| info.holder)
                    .unwrap_or_else(|| "unknown".to_string());
                return Err(crate::Error::OperationInProgress(current));
            }
            Err(e) => return Err(e.into()),
        };

        let content = format!("{}\n{}\n", holder, std::process::id());
        if let Err(e) = file
            .write_all(content.as_bytes())
            .and_then(|_| file.sync_all())
        {
            let _ = fs::remove_file(&path);
            return Err(e.into());
        }

        tracing::debug!("Acquired restore lock for {}", holder);
        Ok(Self {
            path,
            holder: holder.to_string(),
            released: false,
        })
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Release the lock.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tracing::debug!("Released restore lock for {}", self.holder);
        Ok(())
    }

    /// Leave the lock file in place after this guard is gone.
    ///
    /// Used when the record could not be finalized; `recover` clears it.
    pub fn keep(mut self) {
        self.released = true;
        tracing::warn!("Restore lock for {} left in place", self.holder);
    }
}

impl Drop for RestoreLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = fs::remove_file(&self.path);
        }
    }
}

fn lock_path(state_dir: &Path) -> PathBuf {
    state_dir.join(LOCK_FILE)
}

/// The current lock, if held.
pub fn read(state_dir: &Path) -> Option<LockInfo> {
    fs::read_to_string(lock_path(state_dir))
        .ok()
        .map(|s| LockInfo::parse(&s))
}

/// Remove a lock left behind by a process that is gone.
pub fn force_release(state_dir: &Path) -> Result<()> {
    match fs::remove_file(lock_path(state_dir)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_acquire_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let lock = RestoreLock::acquire(temp_dir.path(), "op-1").unwrap();

        let err = RestoreLock::acquire(temp_dir.path(), "op-2").unwrap_err();
        assert_eq!(err.code(), "OPERATION_IN_PROGRESS");
        assert!(err.to_string().contains("op-1"));

        lock.release().unwrap();
        assert!(read(temp_dir.path()).is_none());
        let lock = RestoreLock::acquire(temp_dir.path(), "op-2").unwrap();
        assert_eq!(lock.holder(), "op-2");
    }

    #[test]
    fn test_lock_records_owner() {
        let temp_dir = TempDir::new().unwrap();
        let _lock = RestoreLock::acquire(temp_dir.path(), "op-1").unwrap();

        let info = read(temp_dir.path()).unwrap();
        assert_eq!(info.holder, "op-1");
        assert_eq!(info.pid, Some(std::process::id()));
        assert!(info.owner_alive());
    }

    #[test]
    fn test_drop_releases() {
        let temp_dir = TempDir::new().unwrap();
        {
            let _lock = RestoreLock::acquire(temp_dir.path(), "op-1").unwrap();
            assert!(read(temp_dir.path()).is_some());
        }
        assert!(read(temp_dir.path()).is_none());
    }

    #[test]
    fn test_keep_leaves_lock_file() {
        let temp_dir = TempDir::new().unwrap();
        RestoreLock::acquire(temp_dir.path(), "op-1").unwrap().keep();
        assert_eq!(read(temp_dir.path()).unwrap().holder, "op-1");

        force_release(temp_dir.path()).unwrap();
        assert!(read(temp_dir.path()).is_none());
    }

    #[test]
    fn test_lock_without_pid_is_not_alive() {
        let info = LockInfo::parse("op-1\n");
        assert_eq!(info.holder, "op-1");
        assert!(!info.owner_alive());
    }
}
