//! Offset store configuration.

use std::time::Duration;

/// Tuning knobs for [`crate::LocalOffsetStore`].
#[derive(Debug, Clone)]
pub struct OffsetStoreConfig {
    /// How often dirty topics are flushed to the key-value store.
    pub flush_interval: Duration,

    /// Capacity of the progress queue.
    ///
    /// `store` suspends once this many updates are waiting, which pushes back
    /// on the producer of progress updates.
    pub queue_capacity: usize,

    /// Capacity of the flush error channel.
    ///
    /// When it is full the store's loop waits for the caller to drain it.
    pub error_capacity: usize,
}

impl Default for OffsetStoreConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(3),
            queue_capacity: 100,
            error_capacity: 16,
        }
    }
}

impl OffsetStoreConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flush_interval(mut self, flush_interval: Duration) -> Self {
        self.flush_interval = flush_interval;
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity.max(1);
        self
    }
}
