//! Process-level run lock.
//!
//! At most one synchronization run may be active against a catalog at any
//! time. The lock is an advisory `fs2` lock on a well-known file; the OS drops
//! it when the holding process exits, so a crash never leaves a stale lock.

use crate::error::LockError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A guard holding the exclusive run lock.
///
/// Dropping the guard releases the lock; [`RunLockGuard::release`] does the
/// same and logs any unlock failure.
pub struct RunLockGuard {
    file: Option<File>,
    lock_path: PathBuf,
}

impl RunLockGuard {
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Release the lock now.
    pub fn release(mut self) {
        self.unlock();
    }

    fn unlock(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };

        if let Err(e) = FileExt::unlock(&file) {
            warn!(lock_path = %self.lock_path.display(), error = %e, "Failed to unlock run lock");
        }
        debug!(lock_path = %self.lock_path.display(), "Run lock released");
    }
}

impl Drop for RunLockGuard {
    fn drop(&mut self) {
        self.unlock();
    }
}

impl std::fmt::Debug for RunLockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLockGuard")
            .field("lock_path", &self.lock_path)
            .field("held", &self.file.is_some())
            .finish()
    }
}

/// Try to acquire the exclusive run lock without waiting.
///
/// The lock file is created if missing. On success the holder's process id
/// and `owner` label are written into it for diagnostics.
///
/// # Errors
///
/// - [`LockError::Locked`] if another run holds the lock
/// - [`LockError::CreateFailed`] if the lock file cannot be opened
/// - [`LockError::AcquireFailed`] for any other locking failure
pub fn try_acquire(lock_path: &Path, owner: &str) -> Result<RunLockGuard, LockError> {
    debug!(lock_path = %lock_path.display(), "Attempting to acquire run lock");

    if let Some(parent) = lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(LockError::CreateFailed)?;
    }

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)
        .map_err(LockError::CreateFailed)?;

    // Fully qualified: newer std has its own File::try_lock_exclusive.
    match FileExt::try_lock_exclusive(&file) {
        Ok(()) => {
            if let Err(e) = write_owner(&file, owner) {
                debug!(error = %e, "Could not record run lock owner");
            }
            info!(lock_path = %lock_path.display(), owner, "Acquired run lock");
            Ok(RunLockGuard {
                file: Some(file),
                lock_path: lock_path.to_path_buf(),
            })
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
            debug!(lock_path = %lock_path.display(), "Run lock held by another run");
            Err(LockError::Locked(lock_path.to_path_buf()))
        }
        Err(e) => Err(LockError::AcquireFailed(e)),
    }
}

fn write_owner(mut file: &File, owner: &str) -> io::Result<()> {
    file.set_len(0)?;
    writeln!(file, "pid={} run={}", std::process::id(), owner)?;
    file.sync_data()
}

/// Whether another run currently holds the lock.
pub fn is_locked(lock_path: &Path) -> bool {
    match try_acquire(lock_path, "check") {
        Ok(guard) => {
            guard.release();
            false
        }
        Err(LockError::Locked(_)) => true,
        Err(e) => {
            warn!(error = %e, "Failed to check run lock status");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_acquire_fails_while_held() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("catalog.db.lock");

        let guard = try_acquire(&lock_path, "run-1").unwrap();
        assert_eq!(guard.lock_path(), lock_path.as_path());

        match try_acquire(&lock_path, "run-2") {
            Err(LockError::Locked(path)) => assert_eq!(path, lock_path),
            other => panic!("expected Locked, got {:?}", other),
        }
        assert!(is_locked(&lock_path));

        guard.release();
        assert!(!is_locked(&lock_path));
        let again = try_acquire(&lock_path, "run-3").unwrap();
        drop(again);
    }

    #[test]
    fn test_drop_releases_lock() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("nested").join("run.lock");

        {
            let _guard = try_acquire(&lock_path, "run-1").unwrap();
            assert!(is_locked(&lock_path));
        }

        assert!(!is_locked(&lock_path));
        let contents = std::fs::read_to_string(&lock_path).unwrap();
        assert!(contents.contains("run=check") || contents.contains("run=run-1"));
    }
}
