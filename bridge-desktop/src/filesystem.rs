//! File System Access Implementation using Tokio

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{FileMetadata, FileSystemAccess},
};
use bytes::Bytes;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Tokio-based file system implementation
///
/// Provides async file I/O operations using:
/// - `tokio::fs` for async operations
/// - temp-file + rename for atomic replacement of pointer and sidecar files
#[derive(Debug, Clone, Default)]
pub struct TokioFileSystem;

impl TokioFileSystem {
    /// Create a new file system accessor
    pub fn new() -> Self {
        Self
    }

    /// Convert std::io::Error to BridgeError, keeping the path for context
    fn map_io_error(path: &Path, e: std::io::Error) -> BridgeError {
        if e.kind() == ErrorKind::NotFound {
            BridgeError::NotFound(path.display().to_string())
        } else {
            BridgeError::Io(std::io::Error::new(
                e.kind(),
                format!("{}: {}", path.display(), e),
            ))
        }
    }

    fn temp_path(path: &Path) -> PathBuf {
        let mut name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| OsString::from("pointer"));
        name.push(".tmp");
        path.with_file_name(name)
    }
}

#[async_trait]
impl FileSystemAccess for TokioFileSystem {
    async fn exists(&self, path: &Path) -> Result<bool> {
        fs::try_exists(path)
            .await
            .map_err(|e| Self::map_io_error(path, e))
    }

    async fn metadata(&self, path: &Path) -> Result<FileMetadata> {
        let metadata = fs::metadata(path)
            .await
            .map_err(|e| Self::map_io_error(path, e))?;

        Ok(FileMetadata {
            size: metadata.len(),
            is_directory: metadata.is_dir(),
        })
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)
            .await
            .map_err(|e| Self::map_io_error(path, e))?;
        debug!(path = ?path, "Created directory");
        Ok(())
    }

    async fn read_file(&self, path: &Path) -> Result<Bytes> {
        let data = fs::read(path)
            .await
            .map_err(|e| Self::map_io_error(path, e))?;
        debug!(path = ?path, size = data.len(), "Read file");
        Ok(Bytes::from(data))
    }

    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()> {
        let tmp = Self::temp_path(path);

        let mut file = fs::File::create(&tmp)
            .await
            .map_err(|e| Self::map_io_error(&tmp, e))?;
        file.write_all(data.as_ref())
            .await
            .map_err(|e| Self::map_io_error(&tmp, e))?;
        file.flush()
            .await
            .map_err(|e| Self::map_io_error(&tmp, e))?;
        drop(file);

        if let Err(e) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(Self::map_io_error(path, e));
        }

        debug!(path = ?path, size = data.len(), "Wrote file");
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path)
            .await
            .map_err(|e| Self::map_io_error(path, e))?;
        debug!(path = ?path, "Deleted file");
        Ok(())
    }

    async fn delete_dir_all(&self, path: &Path) -> Result<()> {
        fs::remove_dir_all(path)
            .await
            .map_err(|e| Self::map_io_error(path, e))?;
        debug!(path = ?path, "Deleted directory");
        Ok(())
    }

    async fn remove_dir_if_empty(&self, path: &Path) -> Result<bool> {
        let mut read_dir = match fs::read_dir(path).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(Self::map_io_error(path, e)),
        };

        if read_dir
            .next_entry()
            .await
            .map_err(|e| Self::map_io_error(path, e))?
            .is_some()
        {
            return Ok(false);
        }

        match fs::remove_dir(path).await {
            Ok(()) => {
                debug!(path = ?path, "Removed empty directory");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Self::map_io_error(path, e)),
        }
    }

    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        let mut read_dir = fs::read_dir(path)
            .await
            .map_err(|e| Self::map_io_error(path, e))?;

        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| Self::map_io_error(path, e))?
        {
            entries.push(entry.path());
        }

        debug!(path = ?path, count = entries.len(), "Listed directory");
        Ok(entries)
    }
}
