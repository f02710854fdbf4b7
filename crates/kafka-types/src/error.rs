//! Error types for kafka-types crate.

use thiserror::Error;

/// Errors that can occur while building or rendering consumed events.
#[derive(Error, Debug)]
pub enum KafkaTypesError {
    #[error("Invalid timestamp: {millis} ms since epoch")]
    InvalidTimestamp { millis: i64 },

    #[error("Invalid google.protobuf.Timestamp: seconds={seconds}, nanos={nanos}")]
    InvalidProtoTimestamp { seconds: i64, nanos: i32 },

    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Result type alias for kafka-types operations.
pub type Result<T> = std::result::Result<T, KafkaTypesError>;
