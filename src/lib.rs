//! # telemhub-relay
//!
//! The relay process around [`telemhub_core::Hub`]: it reads telemetry
//! events from a source, keeps the hub's snapshot and history current, and
//! serves them to clients while forwarding updates downstream.
//!
//! ```text
//!  simulator | stdin | tcp ──▶ Hub ──▶ push endpoint (TCP, NDJSON snapshots)
//!                               │ └──▶ query endpoint (HTTP)
//!                               └───▶ downstream sink (file, tcp, http, nats)
//! ```
//!
//! - **[`config`]**: layered settings (defaults, TOML file, `TELEMHUB_*`
//!   environment, command-line flags)
//! - **[`source`]**: the random-walk simulator and the NDJSON reader
//! - **[`transport`]**: push and query endpoints
//! - **[`sink`]**: downstream sink selection
//!
//! ## Usage
//!
//! ```bash
//! # Simulated drone, snapshots on :8001, queries on :8000
//! telemhub
//!
//! # Events from an upstream decoder, flat JSON POSTed to an ingest service
//! telemhub --connect 10.0.0.2:5760 --sink http \
//!     --sink-target https://ingest.example.com/telemetry --format flat
//! ```

pub mod config;
pub mod duration;
pub mod relay;
pub mod sink;
pub mod source;
pub mod transport;

pub use config::{Overrides, RelayConfig};
pub use relay::Relay;
