//! Filesystem seam for pointer files, sidecars and artwork.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub size: u64,
    pub is_directory: bool,
}

/// Disk access for the pointer tree
///
/// Paths are absolute. Implementations map a missing path to
/// [`BridgeError::NotFound`](crate::error::BridgeError::NotFound) so callers
/// can treat deletes as idempotent.
///
/// ```ignore
/// async fn write_pointer(fs: &dyn FileSystemAccess, path: &Path, url: &str) -> Result<()> {
///     if let Some(parent) = path.parent() {
///         fs.create_dir_all(parent).await?;
///     }
///     fs.write_file(path, format!("{}\n", url).into()).await
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    async fn exists(&self, path: &Path) -> Result<bool>;

    async fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    async fn read_file(&self, path: &Path) -> Result<Bytes>;

    /// Replace `path` atomically; the parent must exist
    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()>;

    async fn delete_file(&self, path: &Path) -> Result<()>;

    /// Remove `path` and everything below it
    async fn delete_dir_all(&self, path: &Path) -> Result<()>;

    /// `true` when the directory was removed, `false` when it was missing or
    /// still had entries
    async fn remove_dir_if_empty(&self, path: &Path) -> Result<bool>;

    /// Direct children of `path`, unordered
    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// Recursively collect files below `root` with the given extension
    ///
    /// A missing root yields an empty list.
    async fn find_files(&self, root: &Path, extension: &str) -> Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        if !self.exists(root).await? {
            return Ok(found);
        }

        let mut pending = vec![root.to_path_buf()];
        while let Some(dir) = pending.pop() {
            for entry in self.list_directory(&dir).await? {
                let metadata = self.metadata(&entry).await?;
                if metadata.is_directory {
                    pending.push(entry);
                } else if entry
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
                {
                    found.push(entry);
                }
            }
        }

        found.sort();
        Ok(found)
    }
}
