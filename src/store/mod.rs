//! File store with named logical roots
//!
//! All artifact paths in the system are relative to one of three configured
//! roots: source uploads, signed outputs, and QR outputs. Writes go through
//! a tmp-then-rename path so a failure never leaves a partially written
//! file behind.

use std::path::{Path, PathBuf};

use tracing::warn;
use uuid::Uuid;

use crate::types::{PipelineError, Result};

/// Logical root a relative path is resolved against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageRoot {
    /// Uploaded source documents and signature images
    SourceUploads,
    /// Composed signed documents
    SignedOutputs,
    /// Generated QR rasters
    QrOutputs,
}

/// File access under configured logical roots
#[derive(Debug, Clone)]
pub struct FileStore {
    source_root: PathBuf,
    signed_root: PathBuf,
    qr_root: PathBuf,
}

impl FileStore {
    /// Create a store over the three configured root directories
    pub fn new(source_root: PathBuf, signed_root: PathBuf, qr_root: PathBuf) -> Self {
        Self {
            source_root,
            signed_root,
            qr_root,
        }
    }

    /// Resolve a relative path against its logical root
    pub fn resolve(&self, root: StorageRoot, relative: &str) -> PathBuf {
        let base = match root {
            StorageRoot::SourceUploads => &self.source_root,
            StorageRoot::SignedOutputs => &self.signed_root,
            StorageRoot::QrOutputs => &self.qr_root,
        };
        base.join(relative)
    }

    /// Check whether a file exists under the given root
    pub async fn exists(&self, root: StorageRoot, relative: &str) -> bool {
        tokio::fs::try_exists(self.resolve(root, relative))
            .await
            .unwrap_or(false)
    }

    /// Read a file under the given root
    pub async fn read(&self, root: StorageRoot, relative: &str) -> Result<Vec<u8>> {
        let path = self.resolve(root, relative);
        tokio::fs::read(&path)
            .await
            .map_err(|e| PipelineError::Storage(format!("read {}: {e}", path.display())))
    }

    /// Write a file under the given root atomically
    ///
    /// The bytes land in a uniquely named sibling tmp file first and are
    /// renamed into place; readers never observe a partial file.
    pub async fn write_atomic(
        &self,
        root: StorageRoot,
        relative: &str,
        bytes: &[u8],
    ) -> Result<()> {
        let path = self.resolve(root, relative);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                PipelineError::Storage(format!("create {}: {e}", parent.display()))
            })?;
        }

        let tmp = tmp_sibling(&path);
        if let Err(e) = tokio::fs::write(&tmp, bytes).await {
            return Err(PipelineError::Storage(format!(
                "write {}: {e}",
                path.display()
            )));
        }

        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
                warn!(tmp = %tmp.display(), error = %cleanup, "Failed to remove stale tmp file");
            }
            return Err(PipelineError::Storage(format!(
                "rename into {}: {e}",
                path.display()
            )));
        }

        Ok(())
    }

    /// Delete a file under the given root
    pub async fn delete(&self, root: StorageRoot, relative: &str) -> Result<()> {
        let path = self.resolve(root, relative);
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| PipelineError::Storage(format!("delete {}: {e}", path.display())))
    }
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{file_name}.tmp-{}", Uuid::new_v4()))
}
