//! Event processing pipeline: consume → decode → filter → emit → commit.
//!
//! ```text
//!            shutdown cancelled / sink failure
//! Running ─────────────────────────────────────► Cancelling
//!    │                                               │
//!    │ channel closed                 channel closed │
//!    ▼                                               ▼
//! Drained ◄──────────────────────────────────────────┘
//!    │
//!    ▼
//! Stopped
//! ```
//!
//! Once cancelling, the pipeline tells the source to stop and keeps reading
//! the event channel, discarding what it gets, until the source closes it.
//! A source blocked on a full channel therefore always gets to finish.

use checkpoint::OffsetStoreHandle;
use kafka_types::Event;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::sink::Sinks;
use crate::source::EventSource;
use crate::subscription::Subscriptions;

/// Whether new events are still emitted. Once the channel reports closed the
/// pipeline is drained, and `run` returning is its stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineState {
    Running,
    Cancelling,
}

/// Counters of one pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineReport {
    /// Events processed while running
    pub received: u64,
    /// Events written to a sink
    pub emitted: u64,
    /// Events decoded but suppressed by the search filter
    pub filtered: u64,
    /// Events that failed to decode or marshal
    pub failed: u64,
    /// Events drained after cancellation
    pub discarded: u64,
}

impl std::fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} received, {} emitted, {} filtered out, {} failed, {} discarded",
            self.received, self.emitted, self.filtered, self.failed, self.discarded
        )
    }
}

/// What a finished pipeline hands back to its caller.
pub struct PipelineOutcome {
    pub report: PipelineReport,
    /// Still open; the caller finalizes them after the offset store is closed
    pub sinks: Sinks,
    /// The failure that cancelled the run, if any
    pub error: Option<Error>,
}

pub struct Pipeline<C: Codec, S: EventSource> {
    codec: Arc<C>,
    source: Arc<S>,
    subscriptions: Arc<Subscriptions>,
    filter: Option<Filter>,
    sinks: Sinks,
    offsets: OffsetStoreHandle,
    events: mpsc::Receiver<Event>,
    state: PipelineState,
    report: PipelineReport,
}

impl<C: Codec, S: EventSource> Pipeline<C, S> {
    pub fn new(
        codec: Arc<C>,
        source: Arc<S>,
        subscriptions: Arc<Subscriptions>,
        filter: Option<Filter>,
        sinks: Sinks,
        offsets: OffsetStoreHandle,
        events: mpsc::Receiver<Event>,
    ) -> Self {
        Self {
            codec,
            source,
            subscriptions,
            filter,
            sinks,
            offsets,
            events,
            state: PipelineState::Running,
            report: PipelineReport::default(),
        }
    }

    /// Run until the event channel is closed.
    ///
    /// `shutdown` is the run's cancellation signal; `stop_source` is cancelled
    /// when the pipeline stops emitting, for whatever reason.
    pub async fn run(
        mut self,
        shutdown: CancellationToken,
        stop_source: CancellationToken,
    ) -> PipelineOutcome {
        let mut failure = None;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled(), if self.state == PipelineState::Running => {
                    info!("Stopping the consumer.");
                    self.cancel(&stop_source);
                }
                event = self.events.recv() => match event {
                    Some(event) if self.state == PipelineState::Running => {
                        if let Err(e) = self.process(event).await {
                            error!("{e}");
                            failure = Some(e);
                            self.cancel(&stop_source);
                        }
                    }
                    Some(_) => self.report.discarded += 1,
                    None => break,
                },
            }
        }

        debug!("Event channel drained ({})", self.report);
        // The source is done either way.
        stop_source.cancel();

        PipelineOutcome {
            report: self.report,
            sinks: self.sinks,
            error: failure,
        }
    }

    fn cancel(&mut self, stop_source: &CancellationToken) {
        if self.state == PipelineState::Running {
            self.state = PipelineState::Cancelling;
            stop_source.cancel();
        }
    }

    /// Handle one event. Only sink failures are returned.
    async fn process(&mut self, event: Event) -> Result<()> {
        self.report.received += 1;

        let output = match self.marshal(&event) {
            Ok(output) => output,
            Err(e) => {
                self.report.failed += 1;
                warn!(
                    "Failed to process the message at offset {} of partition {}, topic {}: {e}",
                    event.offset, event.partition, event.topic
                );
                return Ok(());
            }
        };

        if self.filter.as_ref().map_or(true, |f| f.keep(&output)) {
            self.sinks.write(&event.topic, &output)?;
            self.report.emitted += 1;
        } else {
            self.report.filtered += 1;
        }

        if let Err(e) = self
            .offsets
            .store(&event.topic, event.partition, event.offset)
            .await
        {
            warn!(
                "Failed to store offset {} of partition {}, topic {}: {e}",
                event.offset, event.partition, event.topic
            );
        }
        self.source.store_offset(&event);
        Ok(())
    }

    fn marshal(&self, event: &Event) -> Result<Vec<u8>> {
        let message_type = self
            .subscriptions
            .message_type(&event.topic)
            .ok_or_else(|| Error::UnknownTopic(event.topic.clone()))?;
        let message = self.codec.decode(message_type, &event.value)?;
        self.codec.marshal(&message, event.timestamp)
    }
}
