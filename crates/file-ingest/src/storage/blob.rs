//! Raw byte storage for uploaded files

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Trait for storing uploaded bytes
///
/// Paths returned by `store` are opaque to callers and are handed back
/// unchanged to `local_path` and `delete`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes for a file, returning its storage path
    async fn store(&self, id: Uuid, filename: &str, data: &[u8]) -> Result<String>;

    /// Filesystem location parsers can read the bytes from
    fn local_path(&self, stored_path: &str) -> PathBuf;

    /// Delete stored bytes. Missing files are not an error.
    async fn delete(&self, stored_path: &str) -> Result<()>;
}

/// Local filesystem blob store
pub struct LocalBlobStore {
    upload_dir: PathBuf,
}

impl LocalBlobStore {
    /// Create a store rooted at `upload_dir`, creating it if needed
    pub fn new(upload_dir: impl Into<PathBuf>) -> Result<Self> {
        let upload_dir = upload_dir.into();
        std::fs::create_dir_all(&upload_dir).map_err(|e| {
            Error::storage(format!("Failed to create {}: {}", upload_dir.display(), e))
        })?;
        Ok(Self { upload_dir })
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn store(&self, id: Uuid, filename: &str, data: &[u8]) -> Result<String> {
        let path = self
            .upload_dir
            .join(format!("{}_{}", id, sanitize_filename(filename)));

        tokio::fs::write(&path, data)
            .await
            .map_err(|e| Error::storage(format!("Failed to write {}: {}", path.display(), e)))?;

        tracing::debug!("Stored {} bytes at {}", data.len(), path.display());
        Ok(path.to_string_lossy().into_owned())
    }

    fn local_path(&self, stored_path: &str) -> PathBuf {
        PathBuf::from(stored_path)
    }

    async fn delete(&self, stored_path: &str) -> Result<()> {
        match tokio::fs::remove_file(stored_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Blob already gone: {}", stored_path);
                Ok(())
            }
            Err(e) => Err(Error::storage(format!(
                "Failed to delete {}: {}",
                stored_path, e
            ))),
        }
    }
}

/// Reduce a client-supplied filename to a safe single path component
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename);

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.chars().take(200).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("report 2024.pdf"), "report_2024.pdf");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\data.csv"), "data.csv");
        assert_eq!(sanitize_filename(".."), "upload");
        assert_eq!(sanitize_filename(""), "upload");
    }

    #[tokio::test]
    async fn test_store_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path().join("uploads")).unwrap();
        let id = Uuid::new_v4();

        let stored = store.store(id, "people.csv", b"a,b\n1,2\n").await.unwrap();
        let path = store.local_path(&stored);
        assert!(path.starts_with(store.upload_dir()));
        assert!(path.to_string_lossy().ends_with(&format!("{}_people.csv", id)));
        assert_eq!(std::fs::read(&path).unwrap(), b"a,b\n1,2\n");

        store.delete(&stored).await.unwrap();
        assert!(!path.exists());
        // second delete is a no-op
        store.delete(&stored).await.unwrap();
    }
}
