use async_trait::async_trait;
use kafka_types::Event;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::subscription::Subscriptions;

/// The broker client as seen by the pipeline and the lifecycle.
///
/// Implementations hand out the receiving end of a bounded event channel at
/// construction time and keep the sending end until [`start`](Self::start)
/// returns or [`close`](Self::close) is called, whichever comes first.
#[async_trait]
pub trait EventSource: Send + Sync + 'static {
    /// Consume `subscriptions` until `stop` is cancelled or consumption fails.
    ///
    /// Releases the event channel on every return path, so the pipeline
    /// always reaches the end of its input.
    async fn start(&self, subscriptions: &Subscriptions, stop: CancellationToken) -> Result<()>;

    /// Hint that `event` has been processed.
    fn store_offset(&self, event: &Event);

    /// Release the client. Idempotent, and safe when `start` never ran.
    fn close(&self);
}
