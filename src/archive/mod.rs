//! Archive distribution: unpack a zip into a scratch directory and route its
//! contents into the destination tree.
//!
//! Only two subpaths of the extracted tree are looked at: the soundtrack
//! folder (audio goes to the media subfolder) and the levels folder (scripts
//! go to the destination root). Everything else is discarded with the
//! scratch directory.

pub mod files;
pub mod scratch;

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::error::{HarvestError, Result};
use files::{has_extension, move_file, ConflictPolicy};
use scratch::ScratchDir;

/// Where archive contents are looked up and where they are placed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveLayout {
    /// Name of the staging directory under the destination root.
    pub scratch_dir_name: String,
    /// Destination subfolder for audio files.
    pub media_dir_name: String,
    /// Path inside the archive holding audio files.
    pub audio_subpath: PathBuf,
    /// Path inside the archive holding script files.
    pub script_subpath: PathBuf,
    /// Files at the top of the archive that are deleted.
    pub boilerplate: Vec<String>,
    pub audio_extensions: Vec<String>,
    pub script_extensions: Vec<String>,
}

impl Default for ArchiveLayout {
    fn default() -> Self {
        Self {
            scratch_dir_name: ".mailharvest-extract".to_string(),
            media_dir_name: "Soundtracks".to_string(),
            audio_subpath: PathBuf::from("Sound").join("Level Soundtracks"),
            script_subpath: PathBuf::from("Levels"),
            boilerplate: vec!["README.txt".to_string()],
            audio_extensions: vec!["mp3".into(), "ogg".into(), "wav".into()],
            script_extensions: vec!["js".into()],
        }
    }
}

/// What one call to [`distribute`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DistributeStats {
    pub entries: usize,
    pub audio_moved: usize,
    pub scripts_moved: usize,
    pub boilerplate_removed: usize,
    /// Individual moves that failed (logged, not propagated).
    pub move_failures: usize,
}

/// Unpack `archive` and distribute its contents under `dest_root`.
///
/// The scratch directory is gone when this returns, whether it returns
/// `Ok` or `Err`.
pub fn distribute(
    archive: &Path,
    dest_root: &Path,
    layout: &ArchiveLayout,
    policy: ConflictPolicy,
) -> Result<DistributeStats> {
    let scratch = ScratchDir::create(dest_root.join(&layout.scratch_dir_name))?;
    let mut stats = DistributeStats {
        entries: extract(archive, scratch.path())?,
        ..Default::default()
    };
    info!(
        archive = %archive.display(),
        entries = stats.entries,
        "Extracted archive"
    );

    let media_dir = dest_root.join(&layout.media_dir_name);
    fs::create_dir_all(&media_dir).map_err(|e| HarvestError::io(&media_dir, e))?;

    let (moved, failed) = move_matching(
        &scratch.path().join(&layout.audio_subpath),
        &media_dir,
        &layout.audio_extensions,
        policy,
    )?;
    stats.audio_moved = moved;
    stats.move_failures += failed;

    let (moved, failed) = move_matching(
        &scratch.path().join(&layout.script_subpath),
        dest_root,
        &layout.script_extensions,
        policy,
    )?;
    stats.scripts_moved = moved;
    stats.move_failures += failed;

    for name in &layout.boilerplate {
        let path = scratch.path().join(name);
        if is_regular_file(&path) {
            fs::remove_file(&path).map_err(|e| HarvestError::io(&path, e))?;
            info!(file = %name, "Deleted boilerplate");
            stats.boilerplate_removed += 1;
        }
    }

    scratch.remove()?;
    Ok(stats)
}

/// Extract a zip archive into `into`. Returns the number of files written.
///
/// Entries whose names leave `into` (`..`, absolute paths) and symlink
/// entries are skipped, so nothing outside the scratch directory can be
/// reached through the extracted tree.
fn extract(archive: &Path, into: &Path) -> Result<usize> {
    let file = File::open(archive).map_err(|e| HarvestError::io(archive, e))?;
    let to_extraction_error = |source: zip::result::ZipError| HarvestError::Extraction {
        path: archive.to_path_buf(),
        source,
    };

    let mut zip = ZipArchive::new(BufReader::new(file)).map_err(to_extraction_error)?;
    let mut written = 0;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(to_extraction_error)?;

        let Some(relative) = entry.enclosed_name() else {
            warn!(entry = %entry.name(), "Skipping archive entry outside extraction root");
            continue;
        };
        if is_symlink_entry(entry.unix_mode()) {
            warn!(entry = %entry.name(), "Skipping symlink in archive");
            continue;
        }

        let out = into.join(&relative);
        if entry.is_dir() {
            fs::create_dir_all(&out).map_err(|e| HarvestError::io(&out, e))?;
            continue;
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent).map_err(|e| HarvestError::io(parent, e))?;
        }

        let mut target = File::create(&out).map_err(|e| HarvestError::io(&out, e))?;
        io::copy(&mut entry, &mut target)
            .map_err(|e| to_extraction_error(zip::result::ZipError::Io(e)))?;
        written += 1;
    }

    Ok(written)
}

/// `S_IFLNK` in the entry's Unix mode bits.
fn is_symlink_entry(unix_mode: Option<u32>) -> bool {
    unix_mode.is_some_and(|mode| mode & 0o170000 == 0o120000)
}

/// `true` only for a real directory; a symlink to one does not count.
fn is_real_dir(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_dir())
}

/// `true` only for a regular file; symlinks are never followed.
fn is_regular_file(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_file())
}

/// Move every regular file in `dir` whose extension is in `extensions` into `dest`.
///
/// A missing `dir` is not an error. Returns `(moved, failed)`.
fn move_matching(
    dir: &Path,
    dest: &Path,
    extensions: &[String],
    policy: ConflictPolicy,
) -> Result<(usize, usize)> {
    if !is_real_dir(dir) {
        debug!(path = %dir.display(), "Subpath not in archive, skipping");
        return Ok((0, 0));
    }

    let mut sources: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| HarvestError::io(dir, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| is_regular_file(p) && has_extension(p, extensions))
        .collect();
    sources.sort();

    let mut moved = 0;
    let mut failed = 0;
    for src in sources {
        let Some(name) = src.file_name() else {
            continue;
        };
        let dst = dest.join(name);
        match move_file(&src, &dst, policy) {
            Ok(()) => {
                info!(from = %src.display(), to = %dst.display(), "Moved file");
                moved += 1;
            }
            Err(e) => {
                warn!(file = %src.display(), error = %e, "Failed to move file");
                failed += 1;
            }
        }
    }
    Ok((moved, failed))
}
