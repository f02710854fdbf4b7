//! Checkpoint resolution and local offset storage for prototail
//!
//! # Architecture
//!
//! This crate decides where consumption of every partition begins and
//! remembers how far consumption got:
//! - [`Checkpoint`] is the per-run starting policy, built once from the user's
//!   [`CheckpointIntent`] by [`resolve`]
//! - [`Checkpoint::start_position`] turns the policy into a concrete
//!   [`StartPosition`] for one partition, consulting the stored offset only
//!   when the policy is [`Checkpoint::Resume`]
//! - [`LocalOffsetStore`] is a write-behind cache of the last processed
//!   offset per (topic, partition), flushed periodically and on close
//!
//! ## Storage Backends
//!
//! - `FilesystemStore` - one file per topic under a base directory
//! - `MemoryStore` - process-local map, for tests and dry runs
//!
//! Both implement the byte-oriented [`KeyValueStore`] trait; the offset store
//! owns serialization.
//!
//! ## Resume semantics
//!
//! A stored offset is the *last processed* offset of a partition, so resuming
//! starts at the stored offset plus one and the last processed message is not
//! delivered again after a restart.

mod config;
mod error;
mod filesystem;
mod memory;
mod offsets;
mod progress;
pub mod store;

#[cfg(test)]
mod tests;

use chrono::{DateTime, Utc};

pub use config::OffsetStoreConfig;
pub use error::{OffsetStoreError, Result};
pub use filesystem::FilesystemStore;
pub use memory::MemoryStore;
pub use offsets::{LocalOffsetStore, OffsetStoreHandle};
pub use progress::{is_sentinel, ProgressRecord, OFFSET_NEWEST, OFFSET_OLDEST};
pub use store::KeyValueStore;

/// What the user asked for on the command line.
///
/// At most one of `offset` / `timestamp` is expected to be set; when both are
/// present the explicit offset wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckpointIntent {
    /// Start from the oldest available offset, ignoring stored progress
    pub rewind: bool,
    /// Start from an explicit offset on every partition
    pub offset: Option<i64>,
    /// Start from the first message at or after this time
    pub timestamp: Option<DateTime<Utc>>,
}

impl CheckpointIntent {
    pub fn new(rewind: bool) -> Self {
        Self {
            rewind,
            ..Default::default()
        }
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Consumption starting policy for one run.
///
/// Immutable and shared by every partition of every subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checkpoint {
    /// Start at the oldest available offset, overriding stored progress
    Oldest,
    /// Start at the newest offset, overriding stored progress
    Newest,
    /// Start at an explicit offset; the broker clamps it to the partition's bounds
    Offset(i64),
    /// Start at the first offset whose timestamp is at or after this time
    Timestamp(DateTime<Utc>),
    /// Continue after the stored offset, or start at the newest offset
    Resume,
}

/// Where one partition starts, as handed to the broker client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPosition {
    Beginning,
    End,
    Offset(i64),
    /// Milliseconds since epoch; the broker client converts it to an offset
    Timestamp(i64),
}

/// Build the run's checkpoint from the user's intent.
///
/// Explicit offset beats explicit timestamp, which beats rewind. Offsets below
/// zero are normalized onto the sentinels: `-1` means newest, anything lower
/// means oldest.
pub fn resolve(intent: &CheckpointIntent) -> Checkpoint {
    if let Some(offset) = intent.offset {
        return match offset {
            OFFSET_NEWEST => Checkpoint::Newest,
            o if o <= OFFSET_OLDEST => Checkpoint::Oldest,
            o => Checkpoint::Offset(o),
        };
    }
    if let Some(timestamp) = intent.timestamp {
        return Checkpoint::Timestamp(timestamp);
    }
    if intent.rewind {
        return Checkpoint::Oldest;
    }
    Checkpoint::Resume
}

impl Checkpoint {
    /// Resolve the policy for a single partition.
    ///
    /// `stored` is the partition's last processed offset from the local offset
    /// store. It is only consulted by [`Checkpoint::Resume`]; sentinel values
    /// are treated as "nothing stored".
    pub fn start_position(&self, stored: Option<i64>) -> StartPosition {
        match self {
            Checkpoint::Oldest => StartPosition::Beginning,
            Checkpoint::Newest => StartPosition::End,
            Checkpoint::Offset(offset) => StartPosition::Offset(*offset),
            Checkpoint::Timestamp(ts) => StartPosition::Timestamp(ts.timestamp_millis()),
            Checkpoint::Resume => match stored {
                Some(offset) if !is_sentinel(offset) && offset >= 0 => {
                    StartPosition::Offset(offset + 1)
                }
                _ => StartPosition::End,
            },
        }
    }

    /// Whether the policy needs the stored offsets of the topic.
    pub fn uses_stored_offsets(&self) -> bool {
        matches!(self, Checkpoint::Resume)
    }
}

impl std::fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Checkpoint::Oldest => f.write_str("oldest"),
            Checkpoint::Newest => f.write_str("newest"),
            Checkpoint::Offset(offset) => write!(f, "offset {offset}"),
            Checkpoint::Timestamp(ts) => write!(f, "time {}", ts.to_rfc3339()),
            Checkpoint::Resume => f.write_str("stored offset"),
        }
    }
}
