//! # telemhub-sinks
//!
//! Network sinks for the telemhub downstream publisher.
//!
//! Each sink implements [`telemhub_core::Sink`] and can be handed to
//! [`HubBuilder::sink`](telemhub_core::HubBuilder::sink).
//!
//! ## Supported Targets
//!
//! - **HTTP** (`http` feature) - POSTs each payload to an endpoint, with an
//!   optional bearer token
//! - **NATS** (`nats` feature) - publishes each payload to a subject, either
//!   fire-and-forget or acknowledged through JetStream
//!
//! ## Quick Start (HTTP)
//!
//! ```rust,no_run
//! use telemhub_core::Hub;
//! use telemhub_sinks::http::HttpSink;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sink = HttpSink::builder()
//!         .endpoint("https://ingest.example.com/telemetry")
//!         .bearer_token("secret")
//!         .build()?;
//!
//!     let hub = Hub::builder().sink(sink).build()?;
//!     println!("{} listeners", hub.listener_count());
//!     Ok(())
//! }
//! ```

pub mod error;

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "nats")]
pub mod nats;

pub use error::AdapterError;
