use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use log::{debug, error};
use tokio::{fs, fs::File, io::AsyncWriteExt};
use uuid::Uuid;

/// Derived on-disk name for a device photo: `photo_<id><ext>`, keeping the
/// upload's extension with its leading dot, `.jpg` when the upload has none.
pub fn photo_filename(id: u64, original_name: &str) -> String {
    let ext = Path::new(original_name)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_else(|| ".jpg".to_string());
    format!("photo_{id}{ext}")
}

/// Photo file layout and lifecycle under the cache's `photos/` directory.
#[async_trait]
pub trait PhotoStore: Send + Sync {
    /// Resolve the absolute path for a stored photo filename.
    fn resolve_path(&self, filename: &str) -> Result<PathBuf>;

    /// Persist photo bytes under `filename`. The write goes to a temp file
    /// in the same directory and is renamed into place, so a reader never
    /// observes a half-written photo. Returns the final path.
    async fn write(&self, filename: &str, data: &[u8]) -> Result<PathBuf>;

    /// Read the whole photo back.
    async fn read(&self, filename: &str) -> Result<Vec<u8>>;

    /// Whether the photo file currently exists on disk.
    async fn exists(&self, filename: &str) -> bool;

    /// Delete the resolved path if it exists; Ok if missing.
    async fn delete(&self, filename: &str) -> Result<()>;
}

#[derive(Clone, Debug)]
pub struct PhotoStoreImpl {
    root: PathBuf,
}

impl PhotoStoreImpl {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn ensure_segment(segment: &str) -> Result<()> {
        if segment.is_empty() {
            bail!("photo filename must not be empty");
        }
        if segment.contains('/') || segment.contains('\\') {
            bail!("photo filename must be a single path segment without separators: {segment}");
        }
        if segment == "." || segment == ".." {
            bail!("photo filename must not be '.' or '..'");
        }
        Ok(())
    }
}

#[async_trait]
impl PhotoStore for PhotoStoreImpl {
    fn resolve_path(&self, filename: &str) -> Result<PathBuf> {
        Self::ensure_segment(filename)?;
        Ok(self.root.join(filename))
    }

    async fn write(&self, filename: &str, data: &[u8]) -> Result<PathBuf> {
        let final_path = self.resolve_path(filename)?;
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create_dir_all {:?}", parent))?;
        }
        // write to a temp file under the same directory, then atomic rename
        let tmp_name = format!("{}.{}.part", filename, Uuid::new_v4());
        let tmp_path = final_path
            .parent()
            .map(|p| p.join(&tmp_name))
            .unwrap_or_else(|| PathBuf::from(&tmp_name));

        let mut file = File::create(&tmp_path)
            .await
            .with_context(|| format!("create temp file {:?}", tmp_path))?;
        file.write_all(data)
            .await
            .with_context(|| format!("write {:?}", tmp_path))?;
        file.flush().await.ok();
        drop(file);

        fs::rename(&tmp_path, &final_path)
            .await
            .with_context(|| format!("rename {:?} -> {:?}", tmp_path, final_path))?;
        debug!("wrote {} bytes to {:?}", data.len(), final_path);
        Ok(final_path)
    }

    async fn read(&self, filename: &str) -> Result<Vec<u8>> {
        let path = self.resolve_path(filename)?;
        fs::read(&path).await.with_context(|| format!("open {:?}", path))
    }

    async fn exists(&self, filename: &str) -> bool {
        match self.resolve_path(filename) {
            Ok(path) => fs::try_exists(&path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn delete(&self, filename: &str) -> Result<()> {
        let path = self.resolve_path(filename)?;
        match fs::remove_file(&path).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                error!("remove_file {:?} error: {}", path, e);
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_derivation() {
        assert_eq!(photo_filename(7, "a.png"), "photo_7.png");
        assert_eq!(photo_filename(7, "archive.tar.gz"), "photo_7.gz");
        assert_eq!(photo_filename(12, "noext"), "photo_12.jpg");
    }

    #[test]
    fn traversal_segments_are_rejected() {
        let store = PhotoStoreImpl::new("/tmp/photos");
        assert!(store.resolve_path("").is_err());
        assert!(store.resolve_path("..").is_err());
        assert!(store.resolve_path("a/b").is_err());
        assert!(store.resolve_path("photo_1.jpg").is_ok());
    }

    #[tokio::test]
    async fn write_read_delete_roundtrip() -> Result<()> {
        let tmp_dir = std::env::temp_dir().join(format!("inventory-plus-test-{}", Uuid::new_v4()));
        let store = PhotoStoreImpl::new(&tmp_dir);

        let data = vec![0xFF, 0xD8, 0x00, 0x01, 0x02];
        let path = store.write("photo_1.jpg", &data).await?;
        assert!(path.exists());
        assert!(store.exists("photo_1.jpg").await);
        assert_eq!(store.read("photo_1.jpg").await?, data);

        store.delete("photo_1.jpg").await?;
        assert!(!path.exists());
        // deleting again is not an error
        store.delete("photo_1.jpg").await?;
        Ok(())
    }
}
