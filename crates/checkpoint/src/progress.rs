//! Progress records and offset sentinels.

/// Sentinel meaning "beginning of the log"; never a real message position.
pub const OFFSET_OLDEST: i64 = -2;

/// Sentinel meaning "end of the log"; never a real message position.
pub const OFFSET_NEWEST: i64 = -1;

/// Whether `offset` is one of the start/end of log sentinels.
pub fn is_sentinel(offset: i64) -> bool {
    offset == OFFSET_OLDEST || offset == OFFSET_NEWEST
}

/// One partition's last processed offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

impl ProgressRecord {
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
        }
    }
}
