//! librdkafka-backed [`EventSource`].
//!
//! Partitions are assigned directly rather than through consumer group
//! rebalancing: every partition of every subscribed topic is consumed, each
//! starting where the topic's checkpoint says.

use async_trait::async_trait;
use checkpoint::{OffsetStoreHandle, StartPosition};
use kafka_types::Event;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::BorrowedMessage;
use rdkafka::{Message as _, Offset, TopicPartitionList};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::source::EventSource;
use crate::subscription::{Subscriptions, TopicSubscription};

/// Kafka consumer feeding a bounded event channel.
pub struct KafkaConsumer {
    consumer: Arc<StreamConsumer>,
    offsets: OffsetStoreHandle,
    events: Mutex<Option<mpsc::Sender<Event>>>,
    closed: AtomicBool,
    timeout: Duration,
}

impl KafkaConsumer {
    /// Create the consumer and the channel it delivers events on.
    ///
    /// `offsets` is consulted for the stored progress of topics that resume.
    pub fn new(
        config: &Config,
        offsets: OffsetStoreHandle,
    ) -> Result<(Self, mpsc::Receiver<Event>)> {
        let consumer: StreamConsumer = config.client_config().create()?;
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        info!("Kafka consumer created for {}", config.brokers.join(","));
        Ok((
            Self {
                consumer: Arc::new(consumer),
                offsets,
                events: Mutex::new(Some(tx)),
                closed: AtomicBool::new(false),
                timeout: config.request_timeout(),
            },
            rx,
        ))
    }

    fn take_sender(&self) -> Option<mpsc::Sender<Event>> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    async fn partitions(&self, topic: &str) -> Result<Vec<i32>> {
        let consumer = Arc::clone(&self.consumer);
        let name = topic.to_string();
        let timeout = self.timeout;
        tokio::task::spawn_blocking(move || -> Result<Vec<i32>> {
            let metadata = consumer.fetch_metadata(Some(name.as_str()), timeout)?;
            let Some(meta) = metadata.topics().iter().find(|t| t.name() == name) else {
                return Err(Error::Config(format!("Topic {name} not found")));
            };
            if let Some(err) = meta.error() {
                return Err(Error::Config(format!(
                    "Failed to fetch the metadata of topic {name}: {err:?}"
                )));
            }

            let mut partitions: Vec<i32> = meta.partitions().iter().map(|p| p.id()).collect();
            partitions.sort_unstable();
            if partitions.is_empty() {
                return Err(Error::Config(format!("Topic {name} has no partitions")));
            }
            Ok(partitions)
        })
        .await
        .map_err(|e| Error::Config(format!("Metadata lookup task failed: {e}")))?
    }

    /// Starting offsets of every partition of `subscription`.
    async fn plan(&self, subscription: &TopicSubscription) -> Result<Vec<(i32, Offset)>> {
        let topic = subscription.topic.as_str();
        let partitions = self.partitions(topic).await?;

        // Always queried: this also seeds the offset store, so partitions not
        // consumed in this run keep their stored progress.
        let stored: HashMap<i32, i64> = self.offsets.query(topic).await?;
        let resume = subscription.checkpoint.uses_stored_offsets();

        let mut plan = Vec::with_capacity(partitions.len());
        let mut by_time = TopicPartitionList::new();
        for partition in partitions {
            let last = if resume {
                stored.get(&partition).copied()
            } else {
                None
            };
            match subscription.checkpoint.start_position(last) {
                StartPosition::Beginning => plan.push((partition, Offset::Beginning)),
                StartPosition::End => plan.push((partition, Offset::End)),
                StartPosition::Offset(offset) => plan.push((partition, Offset::Offset(offset))),
                StartPosition::Timestamp(millis) => {
                    by_time.add_partition_offset(topic, partition, Offset::Offset(millis))?;
                }
            }
        }

        if by_time.count() > 0 {
            let consumer = Arc::clone(&self.consumer);
            let timeout = self.timeout;
            let resolved = tokio::task::spawn_blocking(move || -> Result<Vec<(i32, Offset)>> {
                let resolved = consumer.offsets_for_times(by_time, timeout)?;
                Ok(resolved
                    .elements()
                    .iter()
                    .map(|element| {
                        let offset = match element.offset() {
                            Offset::Offset(o) if o >= 0 => Offset::Offset(o),
                            // No message at or after the requested time
                            _ => Offset::End,
                        };
                        (element.partition(), offset)
                    })
                    .collect())
            })
            .await
            .map_err(|e| Error::Config(format!("Offset lookup task failed: {e}")))??;
            plan.extend(resolved);
        }

        plan.sort_by_key(|(partition, _)| *partition);
        for (partition, offset) in &plan {
            debug!("Partition {partition} of topic {topic} starts at {offset:?}");
        }
        Ok(plan)
    }

    async fn assign(&self, subscriptions: &Subscriptions) -> Result<()> {
        let mut assignment = TopicPartitionList::new();
        for subscription in subscriptions.iter() {
            info!(
                "Consuming topic {} ({}) from {}",
                subscription.topic, subscription.message_type, subscription.checkpoint
            );
            for (partition, offset) in self.plan(subscription).await? {
                assignment.add_partition_offset(&subscription.topic, partition, offset)?;
            }
        }
        self.consumer.assign(&assignment)?;
        Ok(())
    }

    async fn consume(&self, events: &mpsc::Sender<Event>, stop: &CancellationToken) {
        loop {
            let received = tokio::select! {
                biased;
                _ = stop.cancelled() => return,
                received = self.consumer.recv() => received,
            };

            let event = match received {
                Ok(message) => match to_event(&message) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!("Skipping a message that can't be represented: {e}");
                        continue;
                    }
                },
                Err(e) => {
                    warn!("Kafka error while consuming: {e}");
                    continue;
                }
            };

            trace!(
                "Received offset {} of partition {}, topic {}",
                event.offset,
                event.partition,
                event.topic
            );
            tokio::select! {
                biased;
                _ = stop.cancelled() => return,
                sent = events.send(event) => {
                    if sent.is_err() {
                        debug!("Event channel closed, stopping the consumer");
                        return;
                    }
                }
            }
        }
    }
}

fn to_event(message: &BorrowedMessage<'_>) -> Result<Event> {
    let event = Event::from_millis(
        message.topic(),
        message.partition(),
        message.offset(),
        message.timestamp().to_millis(),
        message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
    )?
    .with_key(message.key().map(<[u8]>::to_vec));
    Ok(event)
}

#[async_trait]
impl EventSource for KafkaConsumer {
    async fn start(&self, subscriptions: &Subscriptions, stop: CancellationToken) -> Result<()> {
        // Dropped on every return path below, which closes the channel.
        let Some(events) = self.take_sender() else {
            return Err(Error::Config(
                "The consumer has already been started or closed".to_string(),
            ));
        };

        tokio::select! {
            _ = stop.cancelled() => {
                debug!("Stopped before the partitions were assigned");
                return Ok(());
            }
            assigned = self.assign(subscriptions) => assigned?,
        }

        self.consume(&events, &stop).await;
        debug!("The consumer has been stopped.");
        Ok(())
    }

    fn store_offset(&self, event: &Event) {
        if let Err(e) = self
            .consumer
            .store_offset(&event.topic, event.partition, event.offset)
        {
            trace!(
                "Offset {} of partition {}, topic {} not stored with the client: {e}",
                event.offset,
                event.partition,
                event.topic
            );
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        drop(self.take_sender());
        if let Err(e) = self.consumer.unassign() {
            error!("Failed to release the partitions: {e}");
        }
        debug!("The Kafka consumer has been closed.");
    }
}
