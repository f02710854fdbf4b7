//! Topics to consume, each with its message type and starting policy.

use checkpoint::Checkpoint;

use crate::error::{Error, Result};

/// One subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSubscription {
    pub topic: String,
    /// Fully qualified protobuf message type of the topic's values
    pub message_type: String,
    pub checkpoint: Checkpoint,
}

impl TopicSubscription {
    pub fn new(
        topic: impl Into<String>,
        message_type: impl Into<String>,
        checkpoint: Checkpoint,
    ) -> Self {
        Self {
            topic: topic.into(),
            message_type: message_type.into(),
            checkpoint,
        }
    }
}

/// Ordered set of subscriptions, unique by topic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subscriptions {
    topics: Vec<TopicSubscription>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build subscriptions from `--topic` values.
    ///
    /// Each value is either `topic=message.Type` or a bare `topic`, which
    /// takes `default_type`. Every topic shares the same checkpoint.
    pub fn parse<S: AsRef<str>>(
        specs: &[S],
        default_type: Option<&str>,
        checkpoint: &Checkpoint,
    ) -> Result<Self> {
        let mut subscriptions = Self::new();
        for spec in specs {
            let spec = spec.as_ref().trim();
            let (topic, message_type) = match spec.split_once('=') {
                Some((topic, message_type)) => (topic.trim(), Some(message_type.trim())),
                None => (spec, default_type),
            };

            if topic.is_empty() {
                return Err(Error::InvalidSubscription {
                    spec: spec.to_string(),
                    reason: "the topic name cannot be empty".to_string(),
                });
            }
            let message_type = match message_type {
                Some(t) if !t.is_empty() => t,
                _ => {
                    return Err(Error::InvalidSubscription {
                        spec: spec.to_string(),
                        reason: "no message type given (use topic=Type or --message-type)"
                            .to_string(),
                    })
                }
            };

            subscriptions.insert(TopicSubscription::new(
                topic,
                message_type,
                checkpoint.clone(),
            ));
        }
        Ok(subscriptions)
    }

    /// Add a subscription, replacing any earlier one for the same topic.
    pub fn insert(&mut self, subscription: TopicSubscription) {
        match self
            .topics
            .iter_mut()
            .find(|existing| existing.topic == subscription.topic)
        {
            Some(existing) => *existing = subscription,
            None => self.topics.push(subscription),
        }
    }

    pub fn get(&self, topic: &str) -> Option<&TopicSubscription> {
        self.topics.iter().find(|s| s.topic == topic)
    }

    pub fn message_type(&self, topic: &str) -> Option<&str> {
        self.get(topic).map(|s| s.message_type.as_str())
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.topics.iter().map(|s| s.topic.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &TopicSubscription> {
        self.topics.iter()
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}
