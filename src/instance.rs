//! Single-instance guard.
//!
//! The agent holds an exclusive OS lock on a lock file for as long as it runs
//! and writes its pid into the file. A second start fails to take the lock
//! and refuses to run. The OS drops the lock when the holder exits, even on
//! a crash, so a file left behind never blocks a later start.

use crate::error::InstanceError;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// RAII guard holding the lock until dropped.
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
    file: File,
}

impl InstanceLock {
    /// Returns the default lock file path.
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("useraction")
            .join("useraction.lock")
    }

    /// Takes the lock at `path` for this process.
    pub fn acquire(path: &Path) -> Result<Self, InstanceError> {
        let lock_err = |source: std::io::Error| InstanceError::Lock {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(lock_err)?;
        }

        // Never created exclusively or removed: the file is only a lock
        // target, and the OS lock is what decides ownership.
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(lock_err)?;

        if let Err(e) = file.try_lock_exclusive() {
            if e.kind() != fs2::lock_contended_error().kind() {
                return Err(lock_err(e));
            }
            let holder = read_pid(&mut file);
            tracing::debug!(path = ?path, pid = ?holder, "Instance lock is held");
            return Err(InstanceError::AlreadyRunning(holder));
        }

        file.set_len(0).map_err(lock_err)?;
        write!(file, "{}", std::process::id()).map_err(lock_err)?;
        file.flush().map_err(lock_err)?;

        tracing::debug!(path = ?path, pid = std::process::id(), "Instance lock acquired");
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Pid written by the lock holder, if the file can be read.
fn read_pid(file: &mut File) -> Option<u32> {
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = self.file.set_len(0);
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_writes_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("agent.lock");

        let lock = InstanceLock::acquire(&path).unwrap();
        assert_eq!(
            fs::read_to_string(lock.path()).unwrap(),
            std::process::id().to_string()
        );
    }

    #[test]
    fn test_second_instance_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.lock");
        let _held = InstanceLock::acquire(&path).unwrap();

        let err = InstanceLock::acquire(&path).unwrap_err();
        assert!(matches!(err, InstanceError::AlreadyRunning(_)));
        #[cfg(unix)]
        assert!(matches!(
            err,
            InstanceError::AlreadyRunning(Some(pid)) if pid == std::process::id()
        ));
    }

    #[test]
    fn test_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.lock");

        drop(InstanceLock::acquire(&path).unwrap());
        assert!(InstanceLock::acquire(&path).is_ok());
    }

    #[test]
    fn test_leftover_file_does_not_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.lock");
        // A crashed agent leaves its pid behind but no OS lock.
        fs::write(&path, "4242").unwrap();

        let lock = InstanceLock::acquire(&path).unwrap();
        assert_eq!(
            fs::read_to_string(lock.path()).unwrap(),
            std::process::id().to_string()
        );
    }

    #[test]
    fn test_garbage_lock_file_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.lock");
        fs::write(&path, "not a pid, and longer than one").unwrap();

        let lock = InstanceLock::acquire(&path).unwrap();
        assert_eq!(
            fs::read_to_string(lock.path()).unwrap(),
            std::process::id().to_string()
        );
    }
}
