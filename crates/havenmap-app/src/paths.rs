//! Filesystem layout of local document storage and the import manifest.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::constants::IMPORT_MANIFEST_FILE;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Filesystem layout under the configured storage path (by default
/// `$XDG_DATA_HOME/havenmap`).
#[derive(Debug, Clone)]
pub struct AppPaths {
    base_dir: PathBuf,
}

impl AppPaths {
    /// Construct paths rooted under the provided directory, ensuring it exists.
    pub fn new<P: AsRef<Path>>(base: P) -> Result<Self, PathError> {
        let base = base.as_ref().to_path_buf();
        ensure_dir(&base)?;
        Ok(Self { base_dir: base })
    }

    /// Root of the filesystem document store (`.../documents`).
    pub fn documents_base_dir(&self) -> PathBuf {
        self.base_dir.join("documents")
    }

    /// Directory holding one collection's documents, without creating it.
    pub fn collection_dir(&self, collection: &str) -> PathBuf {
        self.documents_base_dir().join(collection)
    }

    /// Same as [`AppPaths::collection_dir`] but creates the directory.
    pub fn ensure_collection_dir(&self, collection: &str) -> Result<PathBuf, PathError> {
        ensure_dir(&self.collection_dir(collection))
    }

    /// Append-only ledger of imported records.
    pub fn import_manifest_path(&self) -> PathBuf {
        self.base_dir.join(IMPORT_MANIFEST_FILE)
    }
}

fn ensure_dir(path: &Path) -> Result<PathBuf, PathError> {
    if let Err(err) = fs::create_dir_all(path)
        && err.kind() != io::ErrorKind::AlreadyExists
    {
        return Err(PathError::CreateDir {
            path: path.to_path_buf(),
            source: err,
        });
    }
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn creates_base_and_collection_dirs() {
        let temp = TempDir::new().expect("temp dir");
        let base = temp.path().join("nested").join("data");
        let paths = AppPaths::new(&base).expect("paths");
        assert!(base.is_dir());

        let collection = paths.collection_dir("resources");
        assert!(!collection.exists());
        let created = paths.ensure_collection_dir("resources").expect("collection dir");
        assert_eq!(created, base.join("documents").join("resources"));
        assert!(created.is_dir());
        assert_eq!(
            paths.import_manifest_path(),
            base.join(IMPORT_MANIFEST_FILE)
        );
    }
}
