//! Error types for the local offset store.

use std::collections::BTreeMap;
use std::path::PathBuf;

use thiserror::Error;

/// Errors reported by [`crate::LocalOffsetStore`].
///
/// `Open`, `Read` and `Deserialize` are returned synchronously; `Serialize` and
/// `Write` are flush failures and arrive on the store's error channel.
#[derive(Error, Debug)]
pub enum OffsetStoreError {
    #[error("Failed to initialise the local offset store at {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read the offsets of topic {topic} from the local offset store: {source}")]
    Read {
        topic: String,
        source: std::io::Error,
    },

    #[error("Failed to deserialize the value from local offset store for topic {topic}: {source}")]
    Deserialize {
        topic: String,
        source: serde_json::Error,
    },

    #[error("Failed to serialise the offsets of topic {topic}: {source}")]
    Serialize {
        topic: String,
        source: serde_json::Error,
    },

    #[error("Failed to write the offsets of topic {topic} to the disk {offsets:?}: {source}")]
    Write {
        topic: String,
        offsets: BTreeMap<i32, i64>,
        source: std::io::Error,
    },

    #[error("The local offset store has been closed")]
    Closed,
}

/// Result type alias for offset store operations.
pub type Result<T> = std::result::Result<T, OffsetStoreError>;
