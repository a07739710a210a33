//! Cache File Module
//!
//! Single-path file handle used for artifact storage.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;

// == Cache File ==
/// Handle on one artifact path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheFile {
    path: PathBuf,
}

impl CacheFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the file name component.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Creates the file, truncating existing content.
    pub fn create(&self) -> Result<()> {
        fs::File::create(&self.path)?;
        Ok(())
    }

    pub fn append(&self, bytes: &[u8]) -> Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(bytes)?;
        Ok(())
    }

    /// Reads the file, `None` if it no longer exists.
    pub fn content(&self) -> Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Removes the file. A file already gone is not an error.
    pub fn delete(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Renames the file within its directory.
    pub fn rename(&mut self, new_name: &str) -> Result<()> {
        let target = match self.path.parent() {
            Some(parent) => parent.join(new_name),
            None => PathBuf::from(new_name),
        };
        fs::rename(&self.path, &target)?;
        self.path = target;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_append_read() {
        let dir = tempfile::tempdir().unwrap();
        let file = CacheFile::new(dir.path().join("entry.cache"));

        file.create().unwrap();
        file.append(b"hello ").unwrap();
        file.append(b"world").unwrap();

        assert_eq!(file.content().unwrap().unwrap(), b"hello world");
        assert_eq!(file.name(), "entry.cache");
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = CacheFile::new(dir.path().join("missing"));

        assert!(file.content().unwrap().is_none());
        file.delete().unwrap();
    }

    #[test]
    fn test_rename_keeps_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = CacheFile::new(dir.path().join("old"));
        file.create().unwrap();
        file.append(b"x").unwrap();

        file.rename("new").unwrap();

        assert_eq!(file.path(), dir.path().join("new"));
        assert!(!dir.path().join("old").exists());
        assert_eq!(file.content().unwrap().unwrap(), b"x");
    }
}
