//! Write-behind local offset store.
//!
//! A single tokio task owns the in-memory map of (topic, partition) → last
//! processed offset. Producers only ever talk to it through a bounded queue,
//! so the map needs no lock and the hot path never waits for the disk.
//!
//! ```text
//! OffsetStoreHandle::store ──► queue ──► actor ──(every flush_interval)──► KeyValueStore
//!                                          │
//!                                          └── flush failures ──► error channel
//! ```
//!
//! A topic's persisted record is merged into the map before the first write
//! of that topic, so partitions that see no progress in a run keep their
//! stored offsets.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use crate::config::OffsetStoreConfig;
use crate::error::{OffsetStoreError, Result};
use crate::filesystem::FilesystemStore;
use crate::progress::{is_sentinel, ProgressRecord};
use crate::store::KeyValueStore;

enum Command {
    Progress(ProgressRecord),
    Close,
}

struct Seed {
    topic: String,
    offsets: HashMap<i32, i64>,
}

/// Producer side of the offset store. Cheap to clone.
#[derive(Clone)]
pub struct OffsetStoreHandle {
    db: Arc<dyn KeyValueStore>,
    tx: mpsc::Sender<Command>,
    // One message per queried topic; never waits, even before `start`.
    seeds: mpsc::UnboundedSender<Seed>,
}

impl OffsetStoreHandle {
    /// Enqueue the last processed offset of a partition.
    ///
    /// Never touches the disk; suspends only while the queue is full. The
    /// start/end of log sentinels are ignored. Failures to persist are
    /// reported on the store's error channel, not here.
    pub async fn store(&self, topic: &str, partition: i32, offset: i64) -> Result<()> {
        if is_sentinel(offset) {
            return Ok(());
        }
        self.tx
            .send(Command::Progress(ProgressRecord::new(topic, partition, offset)))
            .await
            .map_err(|_| OffsetStoreError::Closed)
    }

    /// Load the persisted offsets of every partition of `topic`.
    ///
    /// A topic with no record yields an empty map. The loaded offsets seed the
    /// store's in-memory state so later flushes write the full mapping; offsets
    /// already recorded in this run take precedence over the seed. Once the
    /// store is closed this still reads the flushed state.
    pub async fn query(&self, topic: &str) -> Result<HashMap<i32, i64>> {
        let offsets = read_offsets(self.db.as_ref(), topic).await?;
        let seed = Seed {
            topic: topic.to_string(),
            offsets: offsets.clone(),
        };
        if self.seeds.send(seed).is_err() {
            trace!("Offset store closed, not seeding topic {topic}");
        }
        Ok(offsets)
    }
}

/// Local, write-behind store of per-partition progress.
///
/// Lifecycle: construct, [`query`](Self::query) the subscribed topics,
/// [`start`](Self::start), hand out [`handle`](Self::handle)s, drain
/// [`take_errors`](Self::take_errors), and finally [`close`](Self::close) to
/// flush everything that was enqueued.
pub struct LocalOffsetStore {
    handle: OffsetStoreHandle,
    worker: Option<Worker>,
    task: Option<JoinHandle<()>>,
    errors: Option<mpsc::Receiver<OffsetStoreError>>,
    closed: bool,
}

impl LocalOffsetStore {
    /// Open a filesystem-backed store rooted at `base`.
    ///
    /// The directory is created if it doesn't exist.
    pub fn open(base: impl AsRef<Path>, config: OffsetStoreConfig) -> Result<Self> {
        let base = base.as_ref();
        info!("Initialising local offset store at {}", base.display());
        std::fs::create_dir_all(base).map_err(|source| OffsetStoreError::Open {
            path: base.to_path_buf(),
            source,
        })?;
        Ok(Self::new(Arc::new(FilesystemStore::new(base)), config))
    }

    /// Create a store on top of any key-value backend.
    pub fn new(db: Arc<dyn KeyValueStore>, config: OffsetStoreConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let (seeds_tx, seeds_rx) = mpsc::unbounded_channel();
        let (errors_tx, errors_rx) = mpsc::channel(config.error_capacity.max(1));

        let worker = Worker {
            db: Arc::clone(&db),
            rx,
            seeds: seeds_rx,
            errors: errors_tx,
            offsets: HashMap::new(),
            loaded: HashSet::new(),
            dirty: HashSet::new(),
            flush_interval: config.flush_interval,
        };

        Self {
            handle: OffsetStoreHandle {
                db,
                tx,
                seeds: seeds_tx,
            },
            worker: Some(worker),
            task: None,
            errors: Some(errors_rx),
            closed: false,
        }
    }

    /// Spawn the store's loop. Calling it again is a no-op.
    pub fn start(&mut self) {
        if let Some(worker) = self.worker.take() {
            debug!(
                "Starting the offset store (flush every {:?})",
                worker.flush_interval
            );
            self.task = Some(tokio::spawn(worker.run()));
        }
    }

    /// A producer handle for the pipeline or the broker client.
    pub fn handle(&self) -> OffsetStoreHandle {
        self.handle.clone()
    }

    /// Take the receiving end of the flush error channel.
    ///
    /// The caller must keep draining it; once it is full the store's loop
    /// waits, and so does every `store` call behind it. Returns None after
    /// the first call.
    pub fn take_errors(&mut self) -> Option<mpsc::Receiver<OffsetStoreError>> {
        self.errors.take()
    }

    /// See [`OffsetStoreHandle::store`].
    pub async fn store(&self, topic: &str, partition: i32, offset: i64) -> Result<()> {
        self.handle.store(topic, partition, offset).await
    }

    /// See [`OffsetStoreHandle::query`].
    pub async fn query(&self, topic: &str) -> Result<HashMap<i32, i64>> {
        self.handle.query(topic).await
    }

    /// Flush everything enqueued so far and stop the loop.
    ///
    /// Updates enqueued before this call are persisted (or reported on the
    /// error channel). Handles that store afterwards get
    /// [`OffsetStoreError::Closed`]. Idempotent.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        debug!("Closing the offset store.");

        // A store that was never started may still have queued updates.
        self.start();

        // Nobody took the error channel, so nobody would drain it.
        self.errors.take();

        if self.handle.tx.send(Command::Close).await.is_err() {
            debug!("Offset store loop already stopped");
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Offset store loop terminated abnormally: {e}");
            }
        }
        debug!("The offset store has been closed successfully.");
    }
}

struct Worker {
    db: Arc<dyn KeyValueStore>,
    rx: mpsc::Receiver<Command>,
    seeds: mpsc::UnboundedReceiver<Seed>,
    errors: mpsc::Sender<OffsetStoreError>,
    offsets: HashMap<String, HashMap<i32, i64>>,
    /// Topics whose persisted record has been merged into `offsets`
    loaded: HashSet<String>,
    dirty: HashSet<String>,
    flush_interval: std::time::Duration,
}

impl Worker {
    async fn run(mut self) {
        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.flush_interval, self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.flush().await,
                Some(seed) = self.seeds.recv() => self.seed(seed.topic, seed.offsets),
                command = self.rx.recv() => match command {
                    Some(Command::Progress(progress)) => self.record(progress),
                    Some(Command::Close) | None => {
                        while let Ok(seed) = self.seeds.try_recv() {
                            self.seed(seed.topic, seed.offsets);
                        }
                        debug!("Flushing the offsets to disk.");
                        self.flush().await;
                        return;
                    }
                },
            }
        }
    }

    fn record(&mut self, progress: ProgressRecord) {
        if is_sentinel(progress.offset) {
            return;
        }
        self.offsets
            .entry(progress.topic.clone())
            .or_default()
            .insert(progress.partition, progress.offset);
        self.dirty.insert(progress.topic);
    }

    /// Merge persisted offsets; progress recorded in this run wins.
    fn seed(&mut self, topic: String, offsets: HashMap<i32, i64>) {
        let current = self.offsets.entry(topic.clone()).or_default();
        for (partition, offset) in offsets {
            current.entry(partition).or_insert(offset);
        }
        self.loaded.insert(topic);
    }

    async fn flush(&mut self) {
        let mut topics: Vec<String> = self.dirty.iter().cloned().collect();
        topics.sort();

        for topic in topics {
            if !self.loaded.contains(&topic) {
                match read_offsets(self.db.as_ref(), &topic).await {
                    Ok(stored) => self.seed(topic.clone(), stored),
                    Err(err) => {
                        // Left dirty; the next flush reads the record again.
                        self.report(err).await;
                        continue;
                    }
                }
            }

            let to_write: BTreeMap<i32, i64> = self
                .offsets
                .get(&topic)
                .map(|offsets| {
                    offsets
                        .iter()
                        .filter(|(_, offset)| !is_sentinel(**offset))
                        .map(|(p, o)| (*p, *o))
                        .collect()
                })
                .unwrap_or_default();

            if to_write.is_empty() {
                self.dirty.remove(&topic);
                continue;
            }

            let bytes = match serde_json::to_vec(&to_write) {
                Ok(bytes) => bytes,
                Err(source) => {
                    self.report(OffsetStoreError::Serialize { topic, source })
                        .await;
                    continue;
                }
            };

            trace!("Writing the offset(s) of topic {topic} to the disk {to_write:?}.");
            match self.db.write(&topic, &bytes).await {
                Ok(()) => {
                    self.dirty.remove(&topic);
                }
                Err(source) => {
                    self.report(OffsetStoreError::Write {
                        topic,
                        offsets: to_write,
                        source,
                    })
                    .await;
                }
            }
        }
    }

    async fn report(&self, err: OffsetStoreError) {
        if let Err(mpsc::error::SendError(err)) = self.errors.send(err).await {
            warn!("{err}");
        }
    }
}

async fn read_offsets(db: &dyn KeyValueStore, topic: &str) -> Result<HashMap<i32, i64>> {
    let bytes = db
        .read(topic)
        .await
        .map_err(|source| OffsetStoreError::Read {
            topic: topic.to_string(),
            source,
        })?;

    let Some(bytes) = bytes else {
        return Ok(HashMap::new());
    };

    let offsets: BTreeMap<i32, i64> =
        serde_json::from_slice(&bytes).map_err(|source| OffsetStoreError::Deserialize {
            topic: topic.to_string(),
            source,
        })?;
    Ok(offsets.into_iter().collect())
}
