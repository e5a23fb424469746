//! Attachment routing: pick a strategy from the filename's extension and run it.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::archive::files::{extension_lowercase, normalize_extension, write_file};
use crate::archive::{self, DistributeStats};
use crate::error::{HarvestError, Result};
use crate::ingest::Settings;
use crate::model::attachment::Attachment;

/// How an attachment with a given extension is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Write the bytes to the destination root under the sanitized name.
    Save,
    /// Unpack as a zip and distribute the contents.
    Extract,
    /// Drop the attachment (used to switch off a built-in rule).
    Ignore,
}

/// Extension → strategy mapping. Extensions are stored lowercased, without the dot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTable {
    rules: BTreeMap<String, Strategy>,
}

impl Default for RoutingTable {
    fn default() -> Self {
        let mut table = Self::empty();
        table.insert("js", Strategy::Save);
        table.insert("zip", Strategy::Extract);
        table
    }
}

impl RoutingTable {
    pub fn empty() -> Self {
        Self {
            rules: BTreeMap::new(),
        }
    }

    /// Built-in rules with `overrides` applied on top.
    pub fn with_overrides(overrides: &BTreeMap<String, Strategy>) -> Self {
        let mut table = Self::default();
        for (ext, strategy) in overrides {
            table.insert(ext, *strategy);
        }
        table
    }

    /// Add or replace a rule. A leading dot is accepted (`".js"`).
    pub fn insert(&mut self, extension: &str, strategy: Strategy) {
        let ext = normalize_extension(extension);
        if !ext.is_empty() {
            self.rules.insert(ext, strategy);
        }
    }

    /// Strategy for `filename`, or `None` if it should be ignored.
    pub fn lookup(&self, filename: &str) -> Option<Strategy> {
        let ext = extension_lowercase(Path::new(filename))?;
        match self.rules.get(&ext) {
            Some(Strategy::Ignore) | None => None,
            Some(strategy) => Some(*strategy),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Strategy)> {
        self.rules.iter().map(|(ext, s)| (ext.as_str(), *s))
    }
}

/// Result of routing one attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    Saved { path: PathBuf, bytes: u64 },
    Distributed(DistributeStats),
    Ignored,
}

/// Replace every non-alphanumeric character with `_`.
///
/// One character in, one character out: path separators, dots, and spaces
/// all become underscores, so the result is always a single path component.
/// Distinct names differing only in punctuation collide.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

/// Route one attachment according to `settings.routing`.
///
/// Dispatch uses the original filename's extension; the sanitized name is
/// only used for what gets written to disk.
pub fn route_attachment(attachment: &Attachment, settings: &Settings) -> Result<Routed> {
    let Some(name) = attachment.filename.as_deref() else {
        debug!("Attachment has no filename, skipping");
        return Ok(Routed::Ignored);
    };

    match settings.routing.lookup(name) {
        Some(Strategy::Save) => save_attachment(attachment, name, settings),
        Some(Strategy::Extract) => {
            extract_attachment(attachment, name, settings).map(Routed::Distributed)
        }
        Some(Strategy::Ignore) | None => {
            debug!(filename = %name, "No routing rule for attachment, skipping");
            Ok(Routed::Ignored)
        }
    }
}

fn save_attachment(attachment: &Attachment, name: &str, settings: &Settings) -> Result<Routed> {
    let path = settings.dest_root.join(sanitize_filename(name));
    write_file(&path, &attachment.contents, settings.conflict)?;
    info!(
        filename = %name,
        path = %path.display(),
        bytes = attachment.size(),
        "Saved attachment"
    );
    Ok(Routed::Saved {
        path,
        bytes: attachment.size(),
    })
}

fn extract_attachment(
    attachment: &Attachment,
    name: &str,
    settings: &Settings,
) -> Result<DistributeStats> {
    let staged = settings
        .dest_root
        .join(format!("{}.partial", sanitize_filename(name)));

    let result = fs::write(&staged, &attachment.contents)
        .map_err(|e| HarvestError::io(&staged, e))
        .and_then(|()| {
            archive::distribute(
                &staged,
                &settings.dest_root,
                &settings.layout,
                settings.conflict,
            )
        });

    match fs::remove_file(&staged) {
        Ok(()) => debug!(path = %staged.display(), "Removed staged archive"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %staged.display(), error = %e, "Failed to remove staged archive"),
    }

    result
}
