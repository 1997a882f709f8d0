//! Best-effort forwarding of snapshots to a downstream sink.
//!
//! Snapshots are handed to a single publisher task through a bounded queue.
//! The caller never waits on the sink: a full queue drops the newest
//! snapshot, and every sink failure (encode error, sink error, timeout) is
//! logged and counted, never returned.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use telemhub_types::{category, Snapshot};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::SinkError;
use crate::sink::Sink;
use crate::store::SnapshotStore;
use crate::throttle::Throttle;

/// How snapshots are encoded before they reach the sink.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PayloadFormat {
    /// The full snapshot as JSON.
    #[default]
    Json,
    /// The full snapshot as CBOR.
    Cbor,
    /// One flat JSON object merging the fields of `categories`, tagged with
    /// `"droneId": source_id` and a `"timestamp"` in seconds.
    Flat {
        source_id: String,
        categories: Vec<String>,
    },
}

impl PayloadFormat {
    /// Flat format over position, attitude and battery.
    pub fn flat(source_id: impl Into<String>) -> Self {
        PayloadFormat::Flat {
            source_id: source_id.into(),
            categories: vec![
                category::POSITION.to_string(),
                category::ATTITUDE.to_string(),
                category::BATTERY.to_string(),
            ],
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            PayloadFormat::Cbor => "application/cbor",
            PayloadFormat::Json | PayloadFormat::Flat { .. } => "application/json",
        }
    }

    pub fn encode(&self, snapshot: &Snapshot) -> Result<Vec<u8>, SinkError> {
        match self {
            PayloadFormat::Json => Ok(serde_json::to_vec(snapshot)?),
            PayloadFormat::Cbor => {
                minicbor::to_vec(snapshot).map_err(|e| SinkError::Encode(e.to_string()))
            }
            PayloadFormat::Flat {
                source_id,
                categories,
            } => {
                let mut record = serde_json::Map::new();
                for (name, value) in snapshot.flatten(categories.as_slice()) {
                    record.insert(name, serde_json::to_value(value)?);
                }
                record.insert("droneId".into(), source_id.clone().into());
                record.insert(
                    "timestamp".into(),
                    serde_json::Value::from(snapshot.timestamp_ms as f64 / 1000.0),
                );
                Ok(serde_json::to_vec(&record)?)
            }
        }
    }
}

/// Settings for a [`DownstreamPublisher`].
#[derive(Debug, Clone, PartialEq)]
pub struct PublisherConfig {
    pub interval: Duration,
    pub queue: usize,
    pub timeout: Duration,
    pub format: PayloadFormat,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            interval: Duration::ZERO,
            queue: 64,
            timeout: Duration::from_secs(10),
            format: PayloadFormat::Json,
        }
    }
}

/// What happened to a snapshot handed to the publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
    Queued,
    /// Inside the publish interval; no snapshot was taken.
    Throttled,
    /// The queue was full and the snapshot was dropped.
    QueueFull,
    /// The publisher task is gone.
    Closed,
}

/// Cumulative publisher counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishStats {
    pub queued: u64,
    pub published: u64,
    pub failed: u64,
    pub dropped: u64,
    pub throttled: u64,
}

#[derive(Debug, Default)]
struct Counters {
    queued: AtomicU64,
    published: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    throttled: AtomicU64,
}

/// Front half of the publish path; the back half is a spawned task that
/// owns the sink.
#[derive(Debug)]
pub struct DownstreamPublisher {
    tx: mpsc::Sender<Snapshot>,
    throttle: Throttle,
    counters: Arc<Counters>,
    task: JoinHandle<()>,
    target: String,
}

impl DownstreamPublisher {
    /// Spawn the publisher task. Must be called from within a tokio runtime.
    pub fn spawn(sink: Arc<dyn Sink>, config: PublisherConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue.max(1));
        let counters = Arc::new(Counters::default());
        let target = sink.describe();

        let task = tokio::spawn(run_publisher(
            rx,
            sink,
            config.format,
            config.timeout,
            counters.clone(),
        ));

        Self {
            tx,
            throttle: Throttle::new(config.interval),
            counters,
            task,
            target,
        }
    }

    /// Queue a snapshot without waiting.
    pub fn forward(&self, snapshot: Snapshot) -> ForwardOutcome {
        match self.tx.try_send(snapshot) {
            Ok(()) => {
                self.counters.queued.fetch_add(1, Ordering::Relaxed);
                ForwardOutcome::Queued
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(sink = %self.target, "publish queue full, dropping snapshot");
                ForwardOutcome::QueueFull
            }
            Err(mpsc::error::TrySendError::Closed(_)) => ForwardOutcome::Closed,
        }
    }

    /// Copy the store's snapshot and queue it, unless inside the publish interval.
    pub fn try_forward(&self, store: &SnapshotStore) -> ForwardOutcome {
        self.try_forward_at(Instant::now(), store)
    }

    pub fn try_forward_at(&self, now: Instant, store: &SnapshotStore) -> ForwardOutcome {
        if !self.throttle.try_acquire(now) {
            self.counters.throttled.fetch_add(1, Ordering::Relaxed);
            return ForwardOutcome::Throttled;
        }
        self.forward(store.read_snapshot())
    }

    pub fn stats(&self) -> PublishStats {
        PublishStats {
            queued: self.counters.queued.load(Ordering::Relaxed),
            published: self.counters.published.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            throttled: self.counters.throttled.load(Ordering::Relaxed),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Stop the publisher task. Queued and in-flight publishes are abandoned.
    pub fn abort(&self) {
        self.task.abort();
    }
}

async fn run_publisher(
    mut rx: mpsc::Receiver<Snapshot>,
    sink: Arc<dyn Sink>,
    format: PayloadFormat,
    timeout: Duration,
    counters: Arc<Counters>,
) {
    let target = sink.describe();
    while let Some(snapshot) = rx.recv().await {
        let payload = match format.encode(&snapshot) {
            Ok(payload) => payload,
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(sink = %target, error = %e, "failed to encode snapshot");
                continue;
            }
        };

        let size = payload.len();
        let result = match tokio::time::timeout(timeout, sink.publish(payload)).await {
            Ok(result) => result,
            Err(_) => Err(SinkError::Timeout),
        };

        match result {
            Ok(()) => {
                counters.published.fetch_add(1, Ordering::Relaxed);
                debug!(sink = %target, bytes = size, "published snapshot");
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(sink = %target, error = %e, "publish failed");
            }
        }
    }
    debug!(sink = %target, "publisher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::ChannelSink;
    use async_trait::async_trait;
    use telemhub_types::Event;

    #[derive(Debug)]
    struct FailingSink;

    #[async_trait]
    impl Sink for FailingSink {
        async fn publish(&self, _payload: Vec<u8>) -> Result<(), SinkError> {
            Err(SinkError::Unavailable("offline".into()))
        }

        fn describe(&self) -> String {
            "failing".into()
        }
    }

    #[derive(Debug)]
    struct HangingSink;

    #[async_trait]
    impl Sink for HangingSink {
        async fn publish(&self, _payload: Vec<u8>) -> Result<(), SinkError> {
            std::future::pending::<()>().await;
            Ok(())
        }

        fn describe(&self) -> String {
            "hanging".into()
        }
    }

    fn sample() -> Snapshot {
        Snapshot::builder()
            .timestamp_ms(1_700_000_000_500)
            .category("position", |c| c.field("lat", 33.749).field("lon", -84.388))
            .category("attitude", |c| c.field("yaw", 90.0))
            .category("battery", |c| c.field("remaining", 80))
            .category("gps_status", |c| c.field("satellites", 12))
            .build()
    }

    async fn wait_for(publisher: &DownstreamPublisher, check: impl Fn(&PublishStats) -> bool) {
        for _ in 0..100 {
            if check(&publisher.stats()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached: {:?}", publisher.stats());
    }

    #[test]
    fn json_payload_is_full_snapshot() {
        let snapshot = sample();
        let bytes = PayloadFormat::Json.encode(&snapshot).unwrap();
        let parsed: Snapshot = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed, snapshot);
    }

    #[test]
    fn cbor_payload_decodes() {
        let snapshot = sample();
        let bytes = PayloadFormat::Cbor.encode(&snapshot).unwrap();
        let parsed: Snapshot = minicbor::decode(&bytes).unwrap();
        assert_eq!(parsed, snapshot);
        assert_eq!(PayloadFormat::Cbor.content_type(), "application/cbor");
    }

    #[test]
    fn flat_payload_merges_selected_categories() {
        let bytes = PayloadFormat::flat("drone123").encode(&sample()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["droneId"], "drone123");
        assert_eq!(value["lat"], 33.749);
        assert_eq!(value["yaw"], 90.0);
        assert_eq!(value["remaining"], 80);
        assert_eq!(value["timestamp"], 1_700_000_000.5);
        assert!(value.get("satellites").is_none());
    }

    #[tokio::test]
    async fn forwarded_snapshots_reach_sink() {
        let (sink, mut rx) = ChannelSink::new(8);
        let publisher = DownstreamPublisher::spawn(Arc::new(sink), PublisherConfig::default());

        assert_eq!(publisher.forward(sample()), ForwardOutcome::Queued);

        let payload = rx.recv().await.unwrap();
        let parsed: Snapshot = serde_json::from_slice(&payload).unwrap();
        assert_eq!(parsed, sample());
        wait_for(&publisher, |s| s.published == 1).await;
        assert_eq!(publisher.target(), "channel");
    }

    #[tokio::test]
    async fn full_queue_drops_newest() {
        let (sink, mut rx) = ChannelSink::new(8);
        let config = PublisherConfig {
            queue: 1,
            ..Default::default()
        };
        let publisher = DownstreamPublisher::spawn(Arc::new(sink), config);

        let first = Snapshot::with_timestamp(1);
        let second = Snapshot::with_timestamp(2);
        assert_eq!(publisher.forward(first), ForwardOutcome::Queued);
        assert_eq!(publisher.forward(second), ForwardOutcome::QueueFull);

        let payload = rx.recv().await.unwrap();
        let parsed: Snapshot = serde_json::from_slice(&payload).unwrap();
        assert_eq!(parsed.timestamp_ms, 1);
        assert_eq!(publisher.stats().dropped, 1);
    }

    #[tokio::test]
    async fn sink_failures_are_counted_not_raised() {
        let publisher = DownstreamPublisher::spawn(Arc::new(FailingSink), PublisherConfig::default());

        for _ in 0..3 {
            assert_eq!(publisher.forward(sample()), ForwardOutcome::Queued);
        }
        wait_for(&publisher, |s| s.failed == 3).await;
        assert_eq!(publisher.stats().published, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_sink_times_out() {
        let config = PublisherConfig {
            timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let publisher = DownstreamPublisher::spawn(Arc::new(HangingSink), config);

        publisher.forward(sample());
        publisher.forward(sample());
        wait_for(&publisher, |s| s.failed == 2).await;
    }

    #[tokio::test]
    async fn publish_interval_throttles_store_reads() {
        let (sink, _rx) = ChannelSink::new(8);
        let config = PublisherConfig {
            interval: Duration::from_secs(1),
            ..Default::default()
        };
        let publisher = DownstreamPublisher::spawn(Arc::new(sink), config);
        let store = SnapshotStore::new(10);
        store.apply(Event::builder("battery").field("remaining", 80).build());

        let t0 = Instant::now();
        assert_eq!(publisher.try_forward_at(t0, &store), ForwardOutcome::Queued);
        assert_eq!(
            publisher.try_forward_at(t0 + Duration::from_millis(100), &store),
            ForwardOutcome::Throttled
        );
        assert_eq!(
            publisher.try_forward_at(t0 + Duration::from_secs(1), &store),
            ForwardOutcome::Queued
        );
        assert_eq!(publisher.stats().throttled, 1);
        assert_eq!(publisher.stats().queued, 2);
    }

    #[tokio::test]
    async fn aborted_publisher_reports_closed() {
        let (sink, _rx) = ChannelSink::new(8);
        let publisher = DownstreamPublisher::spawn(Arc::new(sink), PublisherConfig::default());

        publisher.abort();
        for _ in 0..10 {
            if publisher.forward(sample()) == ForwardOutcome::Closed {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("publisher still accepting after abort");
    }
}
