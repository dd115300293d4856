//! Storage for uploaded file bytes.
//!
//! File identifiers are the client's relative upload paths (`shop/boots/1.jpg`).
//! The same identifier is later handed to the oracle and served back under
//! `/uploads/`.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid file identifier: {0}")]
    InvalidPath(String),

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("storage I/O error for {file}: {source}")]
    Io {
        file: String,
        #[source]
        source: io::Error,
    },
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn save(&self, file_id: &str, bytes: &[u8]) -> Result<(), StorageError>;

    async fn read(&self, file_id: &str) -> Result<Vec<u8>, StorageError>;
}

/// Map a file identifier to a path relative to the storage root.
///
/// A leading `/` is ignored. Empty, `.` and `..` segments other than
/// redundant separators are refused so nothing escapes the root.
pub fn relative_path(file_id: &str) -> Result<PathBuf, StorageError> {
    let invalid = || StorageError::InvalidPath(file_id.to_string());

    let mut path = PathBuf::new();
    for segment in file_id.trim_start_matches('/').split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(invalid()),
            s if s.contains(['\\', ':', '\0']) => return Err(invalid()),
            s => path.push(s),
        }
    }

    if path.as_os_str().is_empty() {
        return Err(invalid());
    }
    Ok(path)
}

/// Stores uploads on the local filesystem under a root directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, file_id: &str) -> Result<PathBuf, StorageError> {
        Ok(self.root.join(relative_path(file_id)?))
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn save(&self, file_id: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.resolve(file_id)?;
        let io_err = |source: io::Error| StorageError::Io {
            file: file_id.to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(&path, bytes).await.map_err(io_err)?;

        tracing::debug!(file = %file_id, bytes = bytes.len(), path = %path.display(), "Stored upload");
        Ok(())
    }

    async fn read(&self, file_id: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(file_id)?;
        tokio::fs::read(&path).await.map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                StorageError::NotFound(file_id.to_string())
            } else {
                StorageError::Io {
                    file: file_id.to_string(),
                    source,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_path_strips_leading_slash() {
        assert_eq!(
            relative_path("/shop/boots/1.jpg").unwrap(),
            PathBuf::from("shop/boots/1.jpg")
        );
        assert_eq!(
            relative_path("./shop//a.jpg").unwrap(),
            PathBuf::from("shop/a.jpg")
        );
    }

    #[test]
    fn relative_path_rejects_escapes() {
        for bad in ["../etc/passwd", "shop/../../x", "", "/", "a\\b.jpg", "c:/x.jpg"] {
            assert!(
                matches!(relative_path(bad), Err(StorageError::InvalidPath(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn save_creates_directories_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());

        storage.save("shop/boots/1.jpg", b"jpeg bytes").await.unwrap();

        assert!(dir.path().join("shop/boots/1.jpg").is_file());
        assert_eq!(
            storage.read("shop/boots/1.jpg").await.unwrap(),
            b"jpeg bytes".to_vec()
        );
    }

    #[tokio::test]
    async fn save_overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());

        storage.save("a.jpg", b"first").await.unwrap();
        storage.save("a.jpg", b"second").await.unwrap();
        assert_eq!(storage.read("a.jpg").await.unwrap(), b"second".to_vec());
    }

    #[tokio::test]
    async fn read_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());

        assert!(matches!(
            storage.read("missing.jpg").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn save_rejects_escaping_identifier() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().join("uploads"));

        assert!(matches!(
            storage.save("../outside.jpg", b"x").await,
            Err(StorageError::InvalidPath(_))
        ));
        assert!(!dir.path().join("outside.jpg").exists());
    }
}
