//! Key-value storage trait for persisted offsets.
//!
//! The offset store keeps one record per topic. This trait abstracts where
//! those records live so the same write-behind logic works with:
//! - Filesystem storage (`FilesystemStore`)
//! - In-memory storage (`MemoryStore`)

use async_trait::async_trait;

/// Byte-oriented persistent key-value store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`.
    ///
    /// Returns None if the key doesn't exist.
    async fn read(&self, key: &str) -> std::io::Result<Option<Vec<u8>>>;

    /// Replace the value stored under `key`.
    ///
    /// Readers must observe either the previous value or the new one, never a
    /// partial write.
    async fn write(&self, key: &str, value: &[u8]) -> std::io::Result<()>;
}
