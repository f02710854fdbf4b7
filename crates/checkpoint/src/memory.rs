//! In-memory key-value storage.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::store::KeyValueStore;

/// Process-local KeyValueStore.
///
/// Nothing survives the process; used by tests and by runs that should not
/// remember their progress.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the keys currently stored, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        // A poisoned map is still a consistent map: writes replace whole values.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn read(&self, key: &str) -> std::io::Result<Option<Vec<u8>>> {
        Ok(self.lock().get(key).cloned())
    }

    async fn write(&self, key: &str, value: &[u8]) -> std::io::Result<()> {
        self.lock().insert(key.to_string(), value.to_vec());
        Ok(())
    }
}
