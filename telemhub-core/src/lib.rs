//! # telemhub-core
//!
//! Aggregation and distribution engine for live telemetry.
//!
//! A [`Hub`] takes decoded [`Event`]s one at a time from an [`EventSource`],
//! folds them into an always-current [`Snapshot`] plus a bounded history,
//! and then:
//!
//! - pushes the snapshot to every registered listener, at most once per
//!   broadcast interval, dropping listeners that fail;
//! - forwards it to an optional downstream [`Sink`] on a best-effort basis,
//!   through a bounded queue drained by a single publisher task.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use telemhub_core::{Event, Hub};
//!
//! #[tokio::main]
//! async fn main() {
//!     let hub = Arc::new(Hub::new());
//!     let (events, source) = tokio::sync::mpsc::channel(64);
//!
//!     // Every subscriber gets its own bounded queue of snapshots.
//!     let (_listener, mut snapshots) = hub.subscribe();
//!     let handle = hub.start(source);
//!
//!     events
//!         .send(Event::builder("position").field("lat", 33.749).field("lon", -84.388).build())
//!         .await
//!         .unwrap();
//!
//!     while let Some(snapshot) = snapshots.recv().await {
//!         println!("{:?}", snapshot.get("position"));
//!         break;
//!     }
//!
//!     handle.stop().await;
//! }
//! ```
//!
//! ## Guarantees
//!
//! - History never holds more than its configured capacity.
//! - Snapshots are copied under the store lock and never torn.
//! - A failing listener is removed after exactly one failed delivery.
//! - Sink failures and slow sinks never block or fail ingestion.

mod broadcaster;
mod config;
mod error;
mod hub;
mod publisher;
mod registry;
mod sink;
mod source;
mod store;
mod throttle;

pub use broadcaster::{BroadcastOutcome, BroadcastStats, Broadcaster, DEFAULT_BROADCAST_INTERVAL};
pub use config::HubConfig;
pub use error::{ConfigError, DeliveryError, SinkError};
pub use hub::{DriverState, Hub, HubBuilder, HubHandle};
pub use publisher::{
    DownstreamPublisher, ForwardOutcome, PayloadFormat, PublishStats, PublisherConfig,
};
pub use registry::{Listener, ListenerHandle, ListenerId, ListenerRegistry};
pub use sink::{ChannelSink, FileSink, Sink, TcpSink};
pub use source::EventSource;
pub use store::{SnapshotStore, DEFAULT_HISTORY_CAPACITY};
pub use throttle::Throttle;

// Re-export types for convenience
pub use telemhub_types::{category, Event, EventBuilder, FieldValue, Fields, SchemaVersion, Snapshot};
