//! Blob storage for original files and page rasters.
//!
//! The store is a key/value capability; keys are `/`-delimited UTF-8 under the
//! `files/` and `images/` prefixes. Writes go through a temp file and rename
//! so a cancelled write never leaves a partial blob behind.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::CoreError;

/// Maximum accepted key length in bytes.
const MAX_KEY_LEN: usize = 1024;

/// Key/value blob storage consumed by the pipeline.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), CoreError>;
    async fn get(&self, key: &str) -> Result<Vec<u8>, CoreError>;
    async fn exists(&self, key: &str) -> Result<bool, CoreError>;
    /// A URL under which the blob can be fetched by external consumers.
    async fn url(&self, key: &str) -> Result<String, CoreError>;
}

fn validate_key(key: &str) -> Result<(), CoreError> {
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return Err(CoreError::InvalidArgument(format!(
            "blob key length must be 1..={} bytes",
            MAX_KEY_LEN
        )));
    }
    if key.starts_with('/') || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
        return Err(CoreError::InvalidArgument(format!("malformed blob key: {}", key)));
    }
    Ok(())
}

/// Filesystem-backed blob store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let mut path = self.root.clone();
        for seg in key.split('/') {
            path.push(seg);
        }
        path
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), CoreError> {
        validate_key(key)?;
        let path = self.path_for(key);
        let parent = path
            .parent()
            .ok_or_else(|| CoreError::Internal(format!("blob key has no parent: {}", key)))?;
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| CoreError::Internal(format!("create {}: {}", parent.display(), e)))?;

        // Write-then-rename keeps readers from observing partial blobs.
        let tmp = path.with_extension("part");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| CoreError::Internal(format!("write {}: {}", tmp.display(), e)))?;
        match tokio::fs::rename(&tmp, &path).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let _ = tokio::fs::remove_file(&tmp).await;
                Err(CoreError::Internal(format!("rename {}: {}", path.display(), e)))
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, CoreError> {
        validate_key(key)?;
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CoreError::NotFound(format!("blob {}", key)))
            }
            Err(e) => Err(CoreError::Internal(format!("read {}: {}", path.display(), e))),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, CoreError> {
        validate_key(key)?;
        Ok(tokio::fs::try_exists(self.path_for(key))
            .await
            .unwrap_or(false))
    }

    async fn url(&self, key: &str) -> Result<String, CoreError> {
        validate_key(key)?;
        let path = self.path_for(key);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(CoreError::NotFound(format!("blob {}", key)));
        }
        Ok(format!("file://{}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        store.put("files/abc.pdf", b"content").await.unwrap();
        assert!(store.exists("files/abc.pdf").await.unwrap());
        assert_eq!(store.get("files/abc.pdf").await.unwrap(), b"content");
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        let err = store.get("files/missing.pdf").await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn test_url_points_at_existing_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        store.put("images/p_page_0001.png", b"png").await.unwrap();
        let url = store.url("images/p_page_0001.png").await.unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.ends_with("p_page_0001.png"));
    }

    #[tokio::test]
    async fn test_traversal_keys_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        for key in ["../etc/passwd", "files//x", "/abs", ""] {
            let err = store.put(key, b"x").await.unwrap_err();
            assert_eq!(err.kind(), "invalid_argument", "key {:?}", key);
        }
    }

    #[tokio::test]
    async fn test_overwrite_is_atomic_replace() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        store.put("files/a.pdf", b"one").await.unwrap();
        store.put("files/a.pdf", b"two").await.unwrap();
        assert_eq!(store.get("files/a.pdf").await.unwrap(), b"two");
    }
}
