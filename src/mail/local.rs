//! A directory of `.eml` files as a mail source.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{HarvestError, Result};
use crate::mail::{MailSource, MessageRef};

/// Serves every `*.eml` file in a directory, in file-name order.
#[derive(Debug)]
pub struct EmlDirSource {
    dir: PathBuf,
}

impl EmlDirSource {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.is_dir() {
            return Err(HarvestError::io(
                &dir,
                std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            ));
        }
        Ok(Self { dir })
    }
}

impl MailSource for EmlDirSource {
    fn list(&mut self) -> Result<Vec<MessageRef>> {
        let mut names: Vec<String> = fs::read_dir(&self.dir)
            .map_err(|e| HarvestError::io(&self.dir, e))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| {
                Path::new(name)
                    .extension()
                    .is_some_and(|e| e.eq_ignore_ascii_case("eml"))
            })
            .collect();
        names.sort();
        Ok(names.into_iter().map(MessageRef).collect())
    }

    fn fetch(&mut self, id: &MessageRef) -> Result<Vec<u8>> {
        let path = self.dir.join(&id.0);
        fs::read(&path).map_err(|e| HarvestError::io(&path, e))
    }

    fn close(&mut self) -> Result<()> {
        debug!(dir = %self.dir.display(), "Closed local mail source");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lists_eml_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.eml"), b"Subject: b\r\n\r\n").unwrap();
        fs::write(dir.path().join("a.EML"), b"Subject: a\r\n\r\n").unwrap();
        fs::write(dir.path().join("notes.txt"), b"skip").unwrap();
        fs::create_dir(dir.path().join("sub.eml")).unwrap();

        let mut source = EmlDirSource::open(dir.path()).unwrap();
        let refs = source.list().unwrap();
        assert_eq!(
            refs,
            vec![MessageRef("a.EML".into()), MessageRef("b.eml".into())]
        );
        assert_eq!(source.fetch(&refs[1]).unwrap(), b"Subject: b\r\n\r\n");
        assert!(source.close().is_ok());
    }

    #[test]
    fn test_open_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(EmlDirSource::open(dir.path().join("missing")).is_err());
    }
}
