//! Fixed-path staging directory for one archive at a time.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use crate::error::{HarvestError, Result};

/// A scratch directory that is removed when dropped.
///
/// The name is fixed, so two archives must never be staged at once. Callers
/// should finish with [`ScratchDir::remove`] to surface removal errors; the
/// `Drop` impl only covers early returns.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
    armed: bool,
}

impl ScratchDir {
    /// Create a fresh scratch directory at `path`, clearing any leftover from a crashed run.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if path.exists() {
            warn!(path = %path.display(), "Removing stale scratch directory");
            fs::remove_dir_all(&path).map_err(|e| HarvestError::io(&path, e))?;
        }
        fs::create_dir_all(&path).map_err(|e| HarvestError::io(&path, e))?;
        debug!(path = %path.display(), "Created scratch directory");
        Ok(Self { path, armed: true })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the directory now and report failure.
    pub fn remove(mut self) -> Result<()> {
        self.armed = false;
        remove_tree(&self.path)
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = remove_tree(&self.path) {
            error!(error = %e, "Failed to remove scratch directory");
        }
    }
}

fn remove_tree(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => {
            debug!(path = %path.display(), "Removed scratch directory");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(HarvestError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join(".scratch");
        {
            let scratch = ScratchDir::create(&path).unwrap();
            fs::write(scratch.path().join("f.txt"), b"x").unwrap();
            assert!(path.is_dir());
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_stale_directory_is_replaced() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join(".scratch");
        fs::create_dir_all(path.join("old")).unwrap();
        fs::write(path.join("old/leftover.js"), b"x").unwrap();

        let scratch = ScratchDir::create(&path).unwrap();
        assert!(!path.join("old").exists());
        scratch.remove().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_remove_tolerates_already_gone() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join(".scratch");
        let scratch = ScratchDir::create(&path).unwrap();
        fs::remove_dir_all(&path).unwrap();
        assert!(scratch.remove().is_ok());
    }
}
