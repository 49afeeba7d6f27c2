//! Channel and output I/O.
//!
//! The trainer treats every location as an opaque string and goes through a
//! `DataStore` for all reads and writes. `LocalStore` covers plain paths and
//! `file://` URIs; object-store locations are expected to be staged onto
//! local disk by the platform before the process starts.

use crate::error::{TrainingError, TrainingResult};
use std::path::PathBuf;
use walkdir::WalkDir;

pub trait DataStore {
    /// Files under `uri`, sorted. A file URI lists itself.
    fn list(&self, uri: &str) -> TrainingResult<Vec<String>>;

    fn read(&self, uri: &str) -> TrainingResult<Vec<u8>>;

    fn write(&self, uri: &str, bytes: &[u8]) -> TrainingResult<()>;

    fn exists(&self, uri: &str) -> TrainingResult<bool>;

    fn create_dir_all(&self, uri: &str) -> TrainingResult<()>;

    fn rename(&self, from: &str, to: &str) -> TrainingResult<()>;

    fn remove_dir_all(&self, uri: &str) -> TrainingResult<()>;

    /// Delete one file; a missing file is not an error.
    fn remove_file(&self, uri: &str) -> TrainingResult<()>;

    /// Immediate child directory names of `uri`; empty if it does not exist.
    fn child_dirs(&self, uri: &str) -> TrainingResult<Vec<String>>;
}

/// Join a child name onto a location without interpreting it.
#[must_use]
pub fn join(base: &str, child: &str) -> String {
    if base.ends_with('/') {
        format!("{base}{child}")
    } else {
        format!("{base}/{child}")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStore;

impl LocalStore {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn to_path(uri: &str) -> TrainingResult<PathBuf> {
        if let Some(rest) = uri.strip_prefix("file://") {
            return Ok(PathBuf::from(rest));
        }
        if let Some((scheme, _)) = uri.split_once("://") {
            return Err(TrainingError::failure(format!(
                "unsupported location {uri}: {scheme}:// must be staged to local disk \
                 before training"
            )));
        }
        Ok(PathBuf::from(uri))
    }
}

impl DataStore for LocalStore {
    fn list(&self, uri: &str) -> TrainingResult<Vec<String>> {
        let root = Self::to_path(uri)?;
        if !root.exists() {
            return Err(TrainingError::failure(format!("location does not exist: {uri}")));
        }
        if root.is_file() {
            return Ok(vec![root.to_string_lossy().to_string()]);
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&root).follow_links(true).sort_by_file_name() {
            let entry = entry
                .map_err(|e| TrainingError::failure(format!("failed to list {uri}: {e}")))?;
            if entry.file_type().is_file() {
                files.push(entry.path().to_string_lossy().to_string());
            }
        }
        Ok(files)
    }

    fn read(&self, uri: &str) -> TrainingResult<Vec<u8>> {
        Ok(std::fs::read(Self::to_path(uri)?)?)
    }

    fn write(&self, uri: &str, bytes: &[u8]) -> TrainingResult<()> {
        let path = Self::to_path(uri)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, bytes)?;
        Ok(())
    }

    fn exists(&self, uri: &str) -> TrainingResult<bool> {
        Ok(Self::to_path(uri)?.exists())
    }

    fn create_dir_all(&self, uri: &str) -> TrainingResult<()> {
        std::fs::create_dir_all(Self::to_path(uri)?)?;
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> TrainingResult<()> {
        std::fs::rename(Self::to_path(from)?, Self::to_path(to)?)?;
        Ok(())
    }

    fn remove_dir_all(&self, uri: &str) -> TrainingResult<()> {
        match std::fs::remove_dir_all(Self::to_path(uri)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn remove_file(&self, uri: &str) -> TrainingResult<()> {
        match std::fs::remove_file(Self::to_path(uri)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn child_dirs(&self, uri: &str) -> TrainingResult<Vec<String>> {
        let dir = match std::fs::read_dir(Self::to_path(uri)?) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut out = Vec::new();
        for entry in dir {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                out.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        out.sort();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_list_walks_directory_sorted() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_string_lossy().to_string();
        std::fs::create_dir_all(temp.path().join("nested")).unwrap();
        std::fs::write(temp.path().join("b.jsonl"), "").unwrap();
        std::fs::write(temp.path().join("a.jsonl"), "").unwrap();
        std::fs::write(temp.path().join("nested/c.csv"), "").unwrap();

        let files = LocalStore.list(&root).unwrap();
        assert_eq!(files.len(), 3);
        assert!(files[0].ends_with("a.jsonl"));
        assert!(files[1].ends_with("b.jsonl"));
    }

    #[test]
    fn test_file_uri_and_object_store_uri() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("x.jsonl");
        std::fs::write(&file, "hi").unwrap();

        let uri = format!("file://{}", file.display());
        assert_eq!(LocalStore.read(&uri).unwrap(), b"hi");

        let err = LocalStore.read("s3://bucket/train").unwrap_err();
        assert!(err.to_string().contains("s3://bucket/train"));
    }

    #[test]
    fn test_missing_location_is_named() {
        let err = LocalStore.list("/definitely/not/here").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here"));
    }

    #[test]
    fn test_child_dirs_of_missing_dir_is_empty() {
        assert!(LocalStore.child_dirs("/definitely/not/here").unwrap().is_empty());
    }

    #[test]
    fn test_remove_file_tolerates_missing() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("checkpoint-0001.json");
        std::fs::write(&file, "{}").unwrap();

        let uri = file.to_string_lossy().to_string();
        LocalStore.remove_file(&uri).unwrap();
        assert!(!file.exists());
        LocalStore.remove_file(&uri).unwrap();
    }

    #[test]
    fn test_join() {
        assert_eq!(join("model", "1"), "model/1");
        assert_eq!(join("model/", "1"), "model/1");
    }
}
