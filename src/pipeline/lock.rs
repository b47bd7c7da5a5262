use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::app::{Result, SluiceError};

/// Marker file held for the duration of a run. Removed on drop, including
/// on error paths.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(SluiceError::LockHeld(path));
            }
            Err(e) => return Err(e.into()),
        };
        writeln!(file, "{}", std::process::id())?;

        tracing::debug!("Acquired run lock {}", path.display());
        Ok(Self { path })
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!("Cannot remove lock file {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_second_acquire_fails_until_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sluice.lock");

        let lock = RunLock::acquire(&path).unwrap();
        assert!(path.exists());
        assert!(matches!(
            RunLock::acquire(&path),
            Err(SluiceError::LockHeld(p)) if p == path
        ));

        drop(lock);
        assert!(!path.exists());
        assert_ok!(RunLock::acquire(&path));
    }

    #[test]
    fn test_released_on_error_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.lock");

        let run = || -> Result<()> {
            let _lock = RunLock::acquire(&path)?;
            Err(SluiceError::Other("boom".into()))
        };
        assert_err!(run());
        assert!(!path.exists());
    }
}
