use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;

use crate::error::IoError;

/// Metadata returned by [`Filesystem::metadata`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMetadata {
    /// Size in bytes
    pub len: u64,
    /// True for regular files
    pub is_file: bool,
}

/// Trait for the filesystem operations the cache performs.
///
/// Every read and write made by the existence verifier, the transformer and
/// the cache store goes through this trait, so tests can count or fail calls
/// without touching the real disk layer.
#[async_trait]
pub trait Filesystem: Send + Sync {
    /// Stat a path.
    async fn metadata(&self, path: &Path) -> Result<FileMetadata, IoError>;

    /// Read a whole file.
    async fn read(&self, path: &Path) -> Result<Bytes, IoError>;

    /// Create or truncate `path` and write `data`, flushing before returning.
    async fn write(&self, path: &Path, data: &[u8]) -> Result<(), IoError>;

    /// Atomically move `from` onto `to`, replacing any existing file.
    async fn rename(&self, from: &Path, to: &Path) -> Result<(), IoError>;

    /// Remove a single file.
    async fn remove_file(&self, path: &Path) -> Result<(), IoError>;

    /// Create a directory and all of its parents.
    async fn create_dir_all(&self, path: &Path) -> Result<(), IoError>;

    /// Recursively remove a directory.
    ///
    /// Removing a directory that does not exist is not an error.
    async fn remove_dir_all(&self, path: &Path) -> Result<(), IoError>;
}

// =============================================================================
// Local Filesystem
// =============================================================================

/// [`Filesystem`] backed by `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFilesystem;

impl LocalFilesystem {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Filesystem for LocalFilesystem {
    async fn metadata(&self, path: &Path) -> Result<FileMetadata, IoError> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| IoError::from_std(path, e))?;

        Ok(FileMetadata {
            len: meta.len(),
            is_file: meta.is_file(),
        })
    }

    async fn read(&self, path: &Path) -> Result<Bytes, IoError> {
        tokio::fs::read(path)
            .await
            .map(Bytes::from)
            .map_err(|e| IoError::from_std(path, e))
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<(), IoError> {
        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|e| IoError::from_std(path, e))?;

        file.write_all(data)
            .await
            .map_err(|e| IoError::from_std(path, e))?;

        file.flush().await.map_err(|e| IoError::from_std(path, e))?;
        file.sync_all()
            .await
            .map_err(|e| IoError::from_std(path, e))
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<(), IoError> {
        tokio::fs::rename(from, to)
            .await
            .map_err(|e| IoError::from_std(from, e))
    }

    async fn remove_file(&self, path: &Path) -> Result<(), IoError> {
        tokio::fs::remove_file(path)
            .await
            .map_err(|e| IoError::from_std(path, e))
    }

    async fn create_dir_all(&self, path: &Path) -> Result<(), IoError> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| IoError::from_std(path, e))
    }

    async fn remove_dir_all(&self, path: &Path) -> Result<(), IoError> {
        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(IoError::from_std(path, e)),
        }
    }
}
