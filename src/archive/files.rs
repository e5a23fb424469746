//! File placement under the destination root: writes, moves, and the collision policy.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HarvestError, Result};

/// What to do when the destination path already holds a file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Replace the existing file. Re-running a mailbox yields the same tree.
    #[default]
    Overwrite,
    /// Leave the existing file alone and report a `Conflict`.
    Fail,
}

/// Lowercased extension of `path`, without the dot.
pub fn extension_lowercase(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(str::to_ascii_lowercase)
}

/// Normalize a configured extension: trimmed, no leading dot, lowercased.
pub fn normalize_extension(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// `true` if the extension of `path` is one of `extensions` (case-insensitive,
/// a leading dot in the list is ignored).
pub fn has_extension(path: &Path, extensions: &[String]) -> bool {
    match extension_lowercase(path) {
        Some(ext) => extensions.iter().any(|e| normalize_extension(e) == ext),
        None => false,
    }
}

/// Write `data` to `path`, honoring `policy` if the file exists.
pub fn write_file(path: &Path, data: &[u8], policy: ConflictPolicy) -> Result<()> {
    check_destination(path, policy)?;
    fs::write(path, data).map_err(|e| HarvestError::io(path, e))
}

/// Move `src` to `dst`, honoring `policy` if `dst` exists.
///
/// Tries a rename first and falls back to copy + remove when the rename is
/// refused (e.g. across filesystems).
pub fn move_file(src: &Path, dst: &Path, policy: ConflictPolicy) -> Result<()> {
    check_destination(dst, policy)?;

    // rename replaces an existing file atomically; dst is only touched by the fallback.
    if fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    fs::copy(src, dst).map_err(|e| HarvestError::io(dst, e))?;
    fs::remove_file(src).map_err(|e| HarvestError::io(src, e))
}

fn check_destination(path: &Path, policy: ConflictPolicy) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    // A directory is never replaced, whatever the policy.
    if path.is_dir() || policy == ConflictPolicy::Fail {
        return Err(HarvestError::Conflict(path.to_path_buf()));
    }
    Ok(())
}
