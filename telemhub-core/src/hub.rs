//! The aggregation driver.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use telemhub_types::{Event, Snapshot};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::broadcaster::{BroadcastOutcome, BroadcastStats, Broadcaster};
use crate::config::HubConfig;
use crate::error::ConfigError;
use crate::publisher::{DownstreamPublisher, PayloadFormat, PublishStats};
use crate::registry::{ListenerHandle, ListenerId, ListenerRegistry};
use crate::sink::Sink;
use crate::source::EventSource;
use crate::store::SnapshotStore;

/// Whether the driver is between events or handling one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Processing,
}

/// Owns the store, the listener registry, the broadcaster and the optional
/// downstream publisher, and drives them from an [`EventSource`].
///
/// Share it behind an `Arc`: transports call [`register`](Self::register),
/// [`snapshot`](Self::snapshot) and [`history`](Self::history) while the
/// driver loop runs.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use telemhub_core::{Event, FileSink, Hub};
///
/// #[tokio::main]
/// async fn main() {
///     let hub = Arc::new(
///         Hub::builder()
///             .broadcast_interval(Duration::from_millis(500))
///             .sink(FileSink::new("snapshots.ndjson"))
///             .build()
///             .expect("valid config"),
///     );
///
///     let (events, source) = tokio::sync::mpsc::channel(64);
///     let (_listener, mut snapshots) = hub.subscribe();
///     let handle = hub.start(source);
///
///     events
///         .send(Event::builder("battery").field("remaining", 80).build())
///         .await
///         .unwrap();
///     let snapshot = snapshots.recv().await.unwrap();
///     println!("{} categories", snapshot.len());
///
///     handle.stop().await;
/// }
/// ```
#[derive(Debug)]
pub struct Hub {
    store: SnapshotStore,
    registry: ListenerRegistry,
    broadcaster: Broadcaster,
    publisher: Option<DownstreamPublisher>,
    config: HubConfig,
    processing: AtomicBool,
    closed: AtomicBool,
}

impl Hub {
    /// Create a hub with default settings and no downstream sink.
    pub fn new() -> Self {
        Self::from_parts(HubConfig::default(), None)
    }

    pub fn builder() -> HubBuilder {
        HubBuilder::new()
    }

    fn from_parts(config: HubConfig, publisher: Option<DownstreamPublisher>) -> Self {
        Self {
            store: SnapshotStore::new(config.history_capacity),
            registry: ListenerRegistry::new(),
            broadcaster: Broadcaster::new(config.broadcast_interval),
            publisher,
            config,
            processing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Apply one event, then give the broadcaster and the publisher a chance
    /// to run.
    pub fn ingest(&self, event: Event) -> BroadcastOutcome {
        self.processing.store(true, Ordering::Release);

        debug!(category = event.category(), "applying event");
        self.store.apply(event);
        let outcome = self.broadcaster.maybe_broadcast(&self.store, &self.registry);
        if let Some(publisher) = &self.publisher {
            publisher.try_forward(&self.store);
        }

        self.processing.store(false, Ordering::Release);
        outcome
    }

    /// Add a listener.
    ///
    /// With `greet_listeners` on, the current snapshot is sent first; a
    /// listener that cannot take it is not registered. Returns whether the
    /// listener is now newly registered; always `false` after
    /// [`shutdown`](Self::shutdown).
    pub fn register(&self, handle: ListenerHandle) -> bool {
        if self.is_closed() || self.registry.contains(handle.id()) {
            return false;
        }
        if self.config.greet_listeners {
            let snapshot = Arc::new(self.store.read_snapshot());
            if let Err(e) = handle.send(&snapshot) {
                debug!(listener = %handle.id(), error = %e, "initial snapshot rejected");
                return false;
            }
        }
        let added = self.registry.register(handle.clone());
        // Lost a race with shutdown's drain.
        if added && self.is_closed() {
            self.registry.unregister(handle.id());
            return false;
        }
        if added {
            debug!(listener = %handle.id(), total = self.registry.len(), "listener registered");
        }
        added
    }

    /// Create and register a channel-backed listener using the configured
    /// buffer size.
    pub fn subscribe(&self) -> (ListenerHandle, mpsc::Receiver<Arc<Snapshot>>) {
        let (handle, rx) = ListenerHandle::channel(self.config.listener_buffer);
        self.register(handle.clone());
        (handle, rx)
    }

    pub fn unregister(&self, id: ListenerId) -> bool {
        let removed = self.registry.unregister(id);
        if removed {
            debug!(listener = %id, "listener unregistered");
        }
        removed
    }

    pub fn snapshot(&self) -> Snapshot {
        self.store.read_snapshot()
    }

    /// The most recent `limit` events, oldest first.
    pub fn history(&self, limit: usize) -> Vec<Event> {
        self.store.read_history(limit)
    }

    pub fn listener_count(&self) -> usize {
        self.registry.len()
    }

    pub fn state(&self) -> DriverState {
        if self.processing.load(Ordering::Acquire) {
            DriverState::Processing
        } else {
            DriverState::Idle
        }
    }

    /// True once [`shutdown`](Self::shutdown) has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn broadcast_stats(&self) -> BroadcastStats {
        self.broadcaster.stats()
    }

    /// `None` when no sink is configured.
    pub fn publish_stats(&self) -> Option<PublishStats> {
        self.publisher.as_ref().map(|p| p.stats())
    }

    /// Drive the hub from `source` until it ends or `shutdown` turns true.
    ///
    /// Between events the loop also wakes at the end of a throttled window
    /// to deliver the update that was held back. Either way out ends with
    /// [`shutdown`](Self::shutdown).
    pub async fn run<S: EventSource>(&self, mut source: S, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.broadcaster.interval().as_millis() as u64,
            capacity = self.store.capacity(),
            "aggregation driver started"
        );

        if !*shutdown.borrow() {
            loop {
                let deadline = self.broadcaster.pending_deadline();

                tokio::select! {
                    biased;

                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    event = source.next_event() => match event {
                        Some(event) => {
                            self.ingest(event);
                        }
                        None => {
                            info!("event source ended");
                            break;
                        }
                    },
                    _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                        self.broadcaster.flush_pending(&self.store, &self.registry);
                    }
                }
            }
        }

        self.shutdown();
    }

    /// Spawn [`run`](Self::run) on the current runtime.
    pub fn start<S>(self: &Arc<Self>, source: S) -> HubHandle
    where
        S: EventSource + 'static,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (done_tx, done_rx) = watch::channel(false);
        let hub = self.clone();
        let join = tokio::spawn(async move {
            hub.run(source, stop_rx).await;
            let _ = done_tx.send(true);
        });
        HubHandle {
            stop_tx,
            done_rx,
            join,
        }
    }

    /// Drop every listener after one last best-effort delivery of the
    /// current snapshot, and stop the publisher.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let listeners = self.registry.drain();
        let snapshot = Arc::new(self.store.read_snapshot());
        for listener in &listeners {
            if let Err(e) = listener.send(&snapshot) {
                debug!(listener = %listener.id(), error = %e, "final delivery failed");
            }
        }

        if let Some(publisher) = &self.publisher {
            publisher.abort();
        }

        info!(
            listeners = listeners.len(),
            events = self.store.applied_count(),
            "hub shut down"
        );
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a running driver loop.
#[derive(Debug)]
pub struct HubHandle {
    stop_tx: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,
    join: JoinHandle<()>,
}

impl HubHandle {
    /// Signal shutdown and wait for the driver to finish.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.join.await {
            debug!(error = %e, "driver task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Resolves once the driver has exited, for whatever reason.
    pub async fn finished(&self) {
        let mut done = self.done_rx.clone();
        // A dropped sender means the driver task died; that counts too.
        let _ = done.wait_for(|done| *done).await;
    }
}

/// Builder for configuring a [`Hub`].
#[derive(Debug, Default)]
pub struct HubBuilder {
    config: HubConfig,
    sink: Option<Arc<dyn Sink>>,
}

impl HubBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every setting at once.
    pub fn config(mut self, config: HubConfig) -> Self {
        self.config = config;
        self
    }

    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.config.history_capacity = capacity;
        self
    }

    pub fn broadcast_interval(mut self, interval: Duration) -> Self {
        self.config.broadcast_interval = interval;
        self
    }

    pub fn publish_interval(mut self, interval: Duration) -> Self {
        self.config.publish_interval = interval;
        self
    }

    pub fn publish_queue(mut self, size: usize) -> Self {
        self.config.publish_queue = size;
        self
    }

    pub fn publish_timeout(mut self, timeout: Duration) -> Self {
        self.config.publish_timeout = timeout;
        self
    }

    pub fn payload_format(mut self, format: PayloadFormat) -> Self {
        self.config.payload_format = format;
        self
    }

    pub fn listener_buffer(mut self, size: usize) -> Self {
        self.config.listener_buffer = size;
        self
    }

    pub fn greet_listeners(mut self, greet: bool) -> Self {
        self.config.greet_listeners = greet;
        self
    }

    /// Forward snapshots to `sink`.
    pub fn sink(self, sink: impl Sink + 'static) -> Self {
        self.shared_sink(Arc::new(sink))
    }

    pub fn shared_sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Validate the configuration and build the hub.
    ///
    /// With a sink configured this spawns the publisher task, so it must
    /// run inside a tokio runtime.
    pub fn build(self) -> Result<Hub, ConfigError> {
        self.config.validate()?;
        let publisher = self.sink.map(|sink| {
            info!(sink = %sink.describe(), "downstream publishing enabled");
            DownstreamPublisher::spawn(sink, self.config.publisher())
        });
        Ok(Hub::from_parts(self.config, publisher))
    }
}
