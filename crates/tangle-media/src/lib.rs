//! Disk-backed media store.
//!
//! Inline upload payloads are staged to spool files, copied into the store
//! under a fresh public id, and served back under a public base URL. The
//! spool file is removed only after a successful upload; a failed upload
//! leaves it behind for inspection and fails the enclosing write.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};
use uuid::Uuid;

pub struct MediaStore {
    dir: PathBuf,
    spool: PathBuf,
    base_url: String,
}

impl MediaStore {
    pub async fn new(dir: PathBuf, base_url: String) -> Result<Self> {
        let spool = dir.join("spool");
        fs::create_dir_all(&spool).await?;
        info!("Media storage directory: {}", dir.display());
        Ok(Self {
            dir,
            spool,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write request bytes to a spool file and return its path.
    pub async fn stage(&self, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.spool.join(Uuid::new_v4().to_string());
        fs::write(&path, bytes).await.context("writing spool file")?;
        Ok(path)
    }

    /// Copy a staged file into the store under a fresh public id and return
    /// its public URL.
    pub async fn upload(&self, path: &Path) -> Result<String> {
        let public_id = Uuid::new_v4().to_string();
        let dest = self.dir.join(&public_id);
        fs::copy(path, &dest)
            .await
            .with_context(|| format!("uploading {} to media store", path.display()))?;
        Ok(format!("{}/{}", self.base_url, public_id))
    }

    /// Stage, upload, and clean the spool file up: the whole inline-image
    /// path. The spool file is removed only on success.
    pub async fn store_inline(&self, bytes: &[u8]) -> Result<String> {
        let spooled = self.stage(bytes).await?;
        let url = self.upload(&spooled).await?;
        fs::remove_file(&spooled).await.context("removing spool file")?;
        Ok(url)
    }

    /// Delete a stored object by public id. Tolerates an already-gone file.
    pub async fn delete(&self, public_id: &str) -> Result<()> {
        let path = self.dir.join(public_id);
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted media object {}", public_id);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Media object {} already gone", public_id);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Public id of a stored URL: the last path segment, minus any extension.
    pub fn public_id(url: &str) -> Option<&str> {
        let segment = url.rsplit('/').next()?;
        let id = segment.split('.').next()?;
        if id.is_empty() { None } else { Some(id) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (tempfile::TempDir, MediaStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = MediaStore::new(tmp.path().join("media"), "/uploads".into())
            .await
            .unwrap();
        (tmp, store)
    }

    #[tokio::test]
    async fn store_inline_roundtrip_cleans_spool() {
        let (_tmp, store) = store().await;

        let url = store.store_inline(b"image bytes").await.unwrap();
        assert!(url.starts_with("/uploads/"));

        let public_id = MediaStore::public_id(&url).unwrap();
        let stored = fs::read(store.dir().join(public_id)).await.unwrap();
        assert_eq!(stored, b"image bytes");

        // spool drained
        let mut spool = fs::read_dir(store.dir().join("spool")).await.unwrap();
        assert!(spool.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (_tmp, store) = store().await;
        let url = store.store_inline(b"x").await.unwrap();
        let id = MediaStore::public_id(&url).unwrap();

        store.delete(id).await.unwrap();
        store.delete(id).await.unwrap();
    }

    #[test]
    fn public_id_strips_path_and_extension() {
        assert_eq!(
            MediaStore::public_id("https://cdn.example.com/media/abc123.jpg"),
            Some("abc123")
        );
        assert_eq!(MediaStore::public_id("/uploads/abc123"), Some("abc123"));
        assert_eq!(MediaStore::public_id(""), None);
    }
}
