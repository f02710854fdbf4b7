//! Consumed event type.
//!
//! The broker client produces one [`Event`] per message it reads and hands it
//! to the event processing pipeline, which consumes it exactly once.

use chrono::{DateTime, Utc};

use crate::error::{KafkaTypesError, Result};

/// A raw message read from a topic partition.
///
/// Immutable after creation; the pipeline decodes `value` with the schema
/// registered for `topic`.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Kafka topic name
    pub topic: String,
    /// Kafka partition number
    pub partition: i32,
    /// Kafka offset within the partition
    pub offset: i64,
    /// Message timestamp (UTC)
    pub timestamp: DateTime<Utc>,
    /// Message key (if any)
    pub key: Option<Vec<u8>>,
    /// Raw message payload
    pub value: Vec<u8>,
}

impl Event {
    pub fn new(
        topic: impl Into<String>,
        partition: i32,
        offset: i64,
        timestamp: DateTime<Utc>,
        value: Vec<u8>,
    ) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            timestamp,
            key: None,
            value,
        }
    }

    pub fn with_key(mut self, key: Option<Vec<u8>>) -> Self {
        self.key = key;
        self
    }

    /// Build an event from a broker timestamp in milliseconds since epoch.
    ///
    /// Brokers report `None` when the message carries no timestamp; the
    /// consumption time is used instead.
    pub fn from_millis(
        topic: impl Into<String>,
        partition: i32,
        offset: i64,
        timestamp_ms: Option<i64>,
        value: Vec<u8>,
    ) -> Result<Self> {
        let timestamp = match timestamp_ms {
            Some(millis) => DateTime::<Utc>::from_timestamp_millis(millis)
                .ok_or(KafkaTypesError::InvalidTimestamp { millis })?,
            None => Utc::now(),
        };
        Ok(Self::new(topic, partition, offset, timestamp, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_from_millis() {
        let event = Event::from_millis("orders", 1, 42, Some(1_718_451_045_500), b"x".to_vec())
            .unwrap();
        assert_eq!(event.topic, "orders");
        assert_eq!(event.partition, 1);
        assert_eq!(event.offset, 42);
        assert_eq!(event.timestamp.timestamp_millis(), 1_718_451_045_500);
        assert!(event.key.is_none());
    }

    #[test]
    fn test_event_without_broker_timestamp_uses_now() {
        let before = Utc::now();
        let event = Event::from_millis("orders", 0, 0, None, Vec::new()).unwrap();
        assert!(event.timestamp >= before);
    }

    #[test]
    fn test_event_out_of_range_timestamp() {
        let err = Event::from_millis("orders", 0, 0, Some(i64::MAX), Vec::new()).unwrap_err();
        assert!(matches!(err, KafkaTypesError::InvalidTimestamp { .. }));
    }
}
