//! Filesystem-based key-value storage implementation.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::store::KeyValueStore;

/// Filesystem implementation of the KeyValueStore trait.
///
/// Stores every key as a flat file directly under the base directory. Writes
/// go to a temporary sibling first and are renamed into place.
pub struct FilesystemStore {
    dir: PathBuf,
}

impl FilesystemStore {
    /// Create a new FilesystemStore with the given directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

#[async_trait]
impl KeyValueStore for FilesystemStore {
    async fn read(&self, key: &str) -> std::io::Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn write(&self, key: &str, value: &[u8]) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let target = self.path_for(key);
        let tmp = self.dir.join(format!(".{key}.tmp"));
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, &target).await?;

        tracing::trace!("Wrote {} bytes to {}", value.len(), target.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_read_missing_key() {
        let tmp = TempDir::new().unwrap();
        let store = FilesystemStore::new(tmp.path());
        assert!(store.read("orders").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let tmp = TempDir::new().unwrap();
        let store = FilesystemStore::new(tmp.path().join("nested"));

        store.write("orders", b"first").await.unwrap();
        store.write("orders", b"second").await.unwrap();

        assert_eq!(store.read("orders").await.unwrap(), Some(b"second".to_vec()));
        // The temporary file is renamed away
        assert!(!tmp.path().join("nested/.orders.tmp").exists());
    }
}
