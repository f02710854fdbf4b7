//! Unit tests for the checkpoint crate.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::{
    resolve, Checkpoint, CheckpointIntent, KeyValueStore, LocalOffsetStore, MemoryStore,
    OffsetStoreConfig, OffsetStoreError, StartPosition, OFFSET_NEWEST, OFFSET_OLDEST,
};

/// Key-value store whose writes for the key "bad" fail while `failing` is set.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    failing: AtomicBool,
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn read(&self, key: &str) -> std::io::Result<Option<Vec<u8>>> {
        self.inner.read(key).await
    }

    async fn write(&self, key: &str, value: &[u8]) -> std::io::Result<()> {
        if key == "bad" && self.failing.load(Ordering::SeqCst) {
            return Err(std::io::Error::other("disk full"));
        }
        self.inner.write(key, value).await
    }
}

/// Flush only on close unless a test advances time on purpose.
fn close_only_config() -> OffsetStoreConfig {
    OffsetStoreConfig::new().with_flush_interval(Duration::from_secs(3600))
}

fn offsets(pairs: &[(i32, i64)]) -> HashMap<i32, i64> {
    pairs.iter().copied().collect()
}

async fn persisted(kv: &dyn KeyValueStore, topic: &str) -> Option<HashMap<String, i64>> {
    kv.read(topic)
        .await
        .unwrap()
        .map(|bytes| serde_json::from_slice(&bytes).unwrap())
}

// ============================================================================
// Checkpoint Resolver Tests
// ============================================================================

#[test]
fn test_resolve_explicit_offset() {
    let cp = resolve(&CheckpointIntent::new(false).with_offset(42));
    assert_eq!(cp, Checkpoint::Offset(42));

    // An explicit offset ignores whatever was stored for the partition
    assert_eq!(cp.start_position(Some(100)), StartPosition::Offset(42));
    assert_eq!(cp.start_position(None), StartPosition::Offset(42));
}

#[test]
fn test_resolve_explicit_offset_normalizes_sentinels() {
    assert_eq!(
        resolve(&CheckpointIntent::new(false).with_offset(OFFSET_NEWEST)),
        Checkpoint::Newest
    );
    assert_eq!(
        resolve(&CheckpointIntent::new(false).with_offset(OFFSET_OLDEST)),
        Checkpoint::Oldest
    );
    assert_eq!(
        resolve(&CheckpointIntent::new(false).with_offset(-17)),
        Checkpoint::Oldest
    );
}

#[test]
fn test_resolve_precedence() {
    let ts = Utc.with_ymd_and_hms(2024, 6, 15, 14, 30, 0).unwrap();

    // Offset beats timestamp and rewind
    let intent = CheckpointIntent::new(true)
        .with_timestamp(ts)
        .with_offset(7);
    assert_eq!(resolve(&intent), Checkpoint::Offset(7));

    // Timestamp beats rewind
    let intent = CheckpointIntent::new(true).with_timestamp(ts);
    assert_eq!(resolve(&intent), Checkpoint::Timestamp(ts));
    assert_eq!(
        resolve(&intent).start_position(Some(3)),
        StartPosition::Timestamp(ts.timestamp_millis())
    );
}

#[test]
fn test_resolve_rewind_overrides_stored_progress() {
    let cp = resolve(&CheckpointIntent::new(true));
    assert_eq!(cp, Checkpoint::Oldest);
    assert!(!cp.uses_stored_offsets());
    assert_eq!(cp.start_position(Some(100)), StartPosition::Beginning);
}

#[test]
fn test_resolve_resume_starts_after_last_processed() {
    let cp = resolve(&CheckpointIntent::default());
    assert_eq!(cp, Checkpoint::Resume);
    assert!(cp.uses_stored_offsets());

    assert_eq!(cp.start_position(Some(100)), StartPosition::Offset(101));
    assert_eq!(cp.start_position(Some(0)), StartPosition::Offset(1));
    assert_eq!(cp.start_position(None), StartPosition::End);
    assert_eq!(cp.start_position(Some(OFFSET_OLDEST)), StartPosition::End);
}

#[test]
fn test_checkpoint_display() {
    assert_eq!(Checkpoint::Offset(5).to_string(), "offset 5");
    assert_eq!(Checkpoint::Resume.to_string(), "stored offset");
}

// ============================================================================
// LocalOffsetStore Tests
// ============================================================================

#[tokio::test]
async fn test_last_write_wins_per_partition() {
    let kv = Arc::new(MemoryStore::new());
    let mut store = LocalOffsetStore::new(kv.clone(), close_only_config());
    store.start();

    for offset in [1, 5, 3, 9, 4] {
        store.store("orders", 0, offset).await.unwrap();
    }
    store.close().await;

    assert_eq!(store.query("orders").await.unwrap(), offsets(&[(0, 4)]));
}

#[tokio::test]
async fn test_sentinels_are_never_persisted() {
    let kv = Arc::new(MemoryStore::new());
    let mut store = LocalOffsetStore::new(kv.clone(), close_only_config());
    store.start();

    store.store("orders", 0, OFFSET_OLDEST).await.unwrap();
    store.store("orders", 0, 10).await.unwrap();
    store.store("orders", 0, OFFSET_NEWEST).await.unwrap();
    store.store("orders", 1, OFFSET_NEWEST).await.unwrap();
    store.store("only-sentinels", 0, OFFSET_OLDEST).await.unwrap();
    store.close().await;

    let record = persisted(kv.as_ref(), "orders").await.unwrap();
    assert_eq!(record.len(), 1);
    assert_eq!(record["0"], 10);
    assert!(record.values().all(|o| *o >= 0));

    // A topic that only ever saw sentinels has no record at all
    assert_eq!(kv.keys(), vec!["orders".to_string()]);
}

#[tokio::test]
async fn test_close_flushes_everything_enqueued() {
    let kv = Arc::new(MemoryStore::new());
    let mut store = LocalOffsetStore::new(kv.clone(), close_only_config());
    store.start();

    for offset in 0..250 {
        store.store("orders", (offset % 3) as i32, offset).await.unwrap();
    }
    store.close().await;

    assert_eq!(
        store.query("orders").await.unwrap(),
        offsets(&[(0, 249), (1, 247), (2, 248)])
    );
}

#[tokio::test(start_paused = true)]
async fn test_periodic_flush_two_topics() {
    let kv = Arc::new(MemoryStore::new());
    let mut store = LocalOffsetStore::new(kv.clone(), OffsetStoreConfig::default());
    store.start();

    store.store("orders", 0, 10).await.unwrap();
    store.store("orders", 1, 20).await.unwrap();
    store.store("payments", 0, 5).await.unwrap();

    // Nothing is written before the first tick
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(kv.keys().is_empty());

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(
        store.query("orders").await.unwrap(),
        offsets(&[(0, 10), (1, 20)])
    );
    assert_eq!(store.query("payments").await.unwrap(), offsets(&[(0, 5)]));

    store.close().await;
}

#[tokio::test]
async fn test_query_missing_topic_is_empty() {
    let kv = Arc::new(MemoryStore::new());
    let store = LocalOffsetStore::new(kv, close_only_config());
    assert!(store.query("unknown").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_query_malformed_record() {
    let kv = Arc::new(MemoryStore::new());
    kv.write("orders", b"not json").await.unwrap();

    let store = LocalOffsetStore::new(kv, close_only_config());
    let err = store.query("orders").await.unwrap_err();
    assert!(matches!(err, OffsetStoreError::Deserialize { ref topic, .. } if topic == "orders"));
}

#[tokio::test]
async fn test_query_seeds_full_mapping() {
    let kv = Arc::new(MemoryStore::new());
    kv.write("orders", br#"{"0":10,"1":20}"#).await.unwrap();

    let mut store = LocalOffsetStore::new(kv.clone(), close_only_config());
    assert_eq!(
        store.query("orders").await.unwrap(),
        offsets(&[(0, 10), (1, 20)])
    );
    store.start();

    // Only partition 0 progresses in this run
    store.store("orders", 0, 11).await.unwrap();
    store.close().await;

    let record = persisted(kv.as_ref(), "orders").await.unwrap();
    assert_eq!(record["0"], 11);
    assert_eq!(record["1"], 20);
}

#[tokio::test]
async fn test_seed_does_not_overwrite_newer_progress() {
    let kv = Arc::new(MemoryStore::new());
    kv.write("orders", br#"{"0":10}"#).await.unwrap();

    let mut store = LocalOffsetStore::new(kv.clone(), close_only_config());
    store.start();
    store.store("orders", 0, 15).await.unwrap();
    store.query("orders").await.unwrap();
    store.close().await;

    assert_eq!(store.query("orders").await.unwrap(), offsets(&[(0, 15)]));
}

#[tokio::test]
async fn test_flush_keeps_partitions_without_progress() {
    let kv = Arc::new(MemoryStore::new());
    kv.write("orders", br#"{"0":10,"1":20}"#).await.unwrap();

    // A run that never queried the topic, e.g. one started with --rewind
    let mut store = LocalOffsetStore::new(kv.clone(), close_only_config());
    store.start();
    store.store("orders", 0, 3).await.unwrap();
    store.close().await;

    let record = persisted(kv.as_ref(), "orders").await.unwrap();
    assert_eq!(record.len(), 2);
    assert_eq!(record["0"], 3);
    assert_eq!(record["1"], 20);
}

#[tokio::test]
async fn test_unreadable_record_is_reported_not_overwritten() {
    let kv = Arc::new(MemoryStore::new());
    kv.write("orders", b"not json").await.unwrap();

    let mut store = LocalOffsetStore::new(kv.clone(), close_only_config());
    let mut errors = store.take_errors().unwrap();
    store.start();
    store.store("orders", 0, 3).await.unwrap();
    store.close().await;

    let err = errors.recv().await.unwrap();
    assert!(matches!(err, OffsetStoreError::Deserialize { ref topic, .. } if topic == "orders"));
    assert_eq!(kv.read("orders").await.unwrap(), Some(b"not json".to_vec()));
}

#[tokio::test]
async fn test_query_many_topics_before_start() {
    let kv = Arc::new(MemoryStore::new());
    for topic in ["a", "b", "c"] {
        kv.write(topic, br#"{"0":1}"#).await.unwrap();
    }

    let mut store = LocalOffsetStore::new(
        kv.clone(),
        close_only_config().with_queue_capacity(1),
    );
    tokio::time::timeout(Duration::from_secs(2), async {
        for topic in ["a", "b", "c"] {
            assert_eq!(store.query(topic).await.unwrap(), offsets(&[(0, 1)]));
        }
    })
    .await
    .expect("querying before start must not wait on the progress queue");

    store.start();
    store.store("c", 1, 7).await.unwrap();
    store.close().await;

    let record = persisted(kv.as_ref(), "c").await.unwrap();
    assert_eq!(record["0"], 1);
    assert_eq!(record["1"], 7);
}

#[tokio::test(start_paused = true)]
async fn test_write_failure_is_reported_and_retried() {
    let kv = Arc::new(FlakyStore::default());
    kv.failing.store(true, Ordering::SeqCst);

    let mut store = LocalOffsetStore::new(kv.clone(), OffsetStoreConfig::default());
    let mut errors = store.take_errors().unwrap();
    store.start();

    store.store("bad", 0, 1).await.unwrap();
    store.store("good", 0, 2).await.unwrap();

    tokio::time::sleep(Duration::from_secs(4)).await;
    let err = errors.recv().await.unwrap();
    assert!(matches!(err, OffsetStoreError::Write { ref topic, .. } if topic == "bad"));

    // The failing topic doesn't hold the others back
    assert_eq!(
        persisted(&kv.inner, "good").await.unwrap()["0"],
        2
    );
    assert!(persisted(&kv.inner, "bad").await.is_none());

    // Still dirty, so the next tick writes it
    kv.failing.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(persisted(&kv.inner, "bad").await.unwrap()["0"], 1);

    store.close().await;
    assert!(errors.recv().await.is_none());
}

#[tokio::test]
async fn test_store_after_close_fails() {
    let kv = Arc::new(MemoryStore::new());
    let mut store = LocalOffsetStore::new(kv, close_only_config());
    let handle = store.handle();
    store.start();
    store.close().await;

    let err = handle.store("orders", 0, 1).await.unwrap_err();
    assert!(matches!(err, OffsetStoreError::Closed));

    // Sentinels never reach the queue, so they never fail
    handle.store("orders", 0, OFFSET_NEWEST).await.unwrap();
}

#[tokio::test]
async fn test_close_is_idempotent_and_flushes_unstarted_store() {
    let kv = Arc::new(MemoryStore::new());
    let mut store = LocalOffsetStore::new(kv.clone(), close_only_config());

    store.store("orders", 2, 30).await.unwrap();
    store.close().await;
    store.close().await;

    assert_eq!(store.query("orders").await.unwrap(), offsets(&[(2, 30)]));
}

#[test]
fn test_open_rejects_file_as_base_path() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    let result = LocalOffsetStore::open(tmp.path().join("offsets"), OffsetStoreConfig::default());
    assert!(matches!(result, Err(OffsetStoreError::Open { .. })));
}

// ============================================================================
// OffsetStoreConfig Tests
// ============================================================================

#[test]
fn test_offset_store_config_default() {
    let config = OffsetStoreConfig::default();
    assert_eq!(config.flush_interval, Duration::from_secs(3));
    assert_eq!(config.queue_capacity, 100);
}

#[test]
fn test_offset_store_config_queue_capacity_is_at_least_one() {
    let config = OffsetStoreConfig::new().with_queue_capacity(0);
    assert_eq!(config.queue_capacity, 1);
}
