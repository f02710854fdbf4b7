//! Startup and shutdown sequencing of one consumer run.

use anyhow::Context;
use checkpoint::LocalOffsetStore;
use kafka_types::Event;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::codec::Codec;
use crate::filter::Filter;
use crate::pipeline::{Pipeline, PipelineReport};
use crate::sink::Sinks;
use crate::source::EventSource;
use crate::subscription::Subscriptions;

/// Result of a run that shut down cleanly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub report: PipelineReport,
}

/// Owns every component of a run and tears them down in order.
pub struct Lifecycle<C: Codec, S: EventSource> {
    store: LocalOffsetStore,
    source: Arc<S>,
    events: mpsc::Receiver<Event>,
    codec: Arc<C>,
    subscriptions: Arc<Subscriptions>,
    filter: Option<Filter>,
    sinks: Sinks,
}

impl<C: Codec, S: EventSource> Lifecycle<C, S> {
    /// `events` is the channel `source` delivers on.
    pub fn new(
        store: LocalOffsetStore,
        source: Arc<S>,
        events: mpsc::Receiver<Event>,
        codec: C,
        subscriptions: Subscriptions,
        filter: Option<Filter>,
        sinks: Sinks,
    ) -> Self {
        Self {
            store,
            source,
            events,
            codec: Arc::new(codec),
            subscriptions: Arc::new(subscriptions),
            filter,
            sinks,
        }
    }

    /// Consume until `shutdown` is cancelled or the source stops.
    ///
    /// Shutdown order: the pipeline drains and stops, the source is closed,
    /// the offset store is closed (final flush), and the sinks are finalized
    /// last. A sink failure inside the pipeline takes precedence over a
    /// failure to start the source.
    pub async fn run(self, shutdown: CancellationToken) -> anyhow::Result<RunSummary> {
        let Self {
            mut store,
            source,
            events,
            codec,
            subscriptions,
            filter,
            sinks,
        } = self;

        store.start();
        let error_logger = store.take_errors().map(|mut errors| {
            tokio::spawn(async move {
                while let Some(e) = errors.recv().await {
                    error!("{e}");
                }
            })
        });

        if subscriptions.is_empty() {
            info!("Nothing to process. Terminating prototail.");
            drop(events);
            source.close();
            store.close().await;
            wait_for(error_logger).await;
            sinks.close().context("Failed to close the output")?;
            return Ok(RunSummary::default());
        }

        let stop_source = CancellationToken::new();
        let pipeline = Pipeline::new(
            codec,
            Arc::clone(&source),
            Arc::clone(&subscriptions),
            filter,
            sinks,
            store.handle(),
            events,
        );
        let pipeline = tokio::spawn(pipeline.run(shutdown, stop_source.clone()));

        let started = source.start(&subscriptions, stop_source).await;
        if let Err(e) = &started {
            error!("Failed to start the consumer: {e}");
        }

        let outcome = pipeline.await;
        debug!("The event processing pipeline has stopped.");

        source.close();
        store.close().await;
        wait_for(error_logger).await;

        let outcome = outcome.context("The event processing pipeline terminated abnormally")?;
        let closed = outcome.sinks.close();
        info!("Processed messages: {}", outcome.report);

        if let Some(e) = outcome.error {
            return Err(anyhow::Error::new(e).context("Failed to write the output"));
        }
        started.context("Failed to start the consumer")?;
        closed.context("Failed to close the output")?;

        debug!("prototail has been terminated successfully.");
        Ok(RunSummary {
            report: outcome.report,
        })
    }
}

async fn wait_for(task: Option<tokio::task::JoinHandle<()>>) {
    if let Some(task) = task {
        if let Err(e) = task.await {
            warn!("Offset store error logger terminated abnormally: {e}");
        }
    }
}
