//! # telemhub-types
//!
//! Core types for telemetry aggregation. This crate defines the events an
//! upstream decoder produces and the aggregated snapshots the hub hands to
//! subscribers and downstream sinks.
//!
//! ## Design Goals
//!
//! - **Zero required dependencies**: Core types work without any serialization framework
//! - **Optional serialization**: Enable `serde` and/or `minicbor` features as needed
//! - **Open category set**: Categories are plain strings, the well-known ones live in [`category`]
//! - **Versioned schema**: Snapshots include version info for forward compatibility
//!
//! ## Features
//!
//! - `std` (default): Standard library support (wall-clock timestamps)
//! - `serde`: JSON/etc. serialization via serde
//! - `minicbor`: Compact binary serialization via CBOR
//! - `all`: Enable all serialization formats
//!
//! ## Example
//!
//! ```rust
//! use telemhub_types::{category, Event, Snapshot};
//!
//! let event = Event::builder(category::POSITION)
//!     .field("lat", 33.749)
//!     .field("lon", -84.388)
//!     .field("alt", 12.5)
//!     .build();
//!
//! let snapshot = Snapshot::builder()
//!     .event(&event)
//!     .category(category::BATTERY, |b| b.field("remaining", 80))
//!     .build();
//!
//! assert_eq!(snapshot.len(), 2);
//! assert_eq!(snapshot.field("battery", "remaining").and_then(|v| v.as_i64()), Some(80));
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod event;
mod snapshot;
mod value;
mod version;

pub use event::*;
pub use snapshot::*;
pub use value::*;
pub use version::*;

/// Current schema version.
///
/// Increment this when making breaking changes to the snapshot format.
pub const SCHEMA_VERSION: u32 = 1;

/// Well-known event categories.
///
/// The set is open: the store accepts any category string, these are the
/// ones the reference sources emit.
pub mod category {
    /// Global position: `lat`, `lon`, `alt`.
    pub const POSITION: &str = "position";
    /// Vehicle attitude in degrees: `roll`, `pitch`, `yaw`.
    pub const ATTITUDE: &str = "attitude";
    /// Battery state: `voltage`, `current`, `remaining`.
    pub const BATTERY: &str = "battery";
    /// GPS receiver state: `fix_type`, `satellites_visible`.
    pub const GPS_STATUS: &str = "gps_status";
    /// Arm and flight mode state: `armed`, `mode`.
    pub const HEARTBEAT: &str = "heartbeat";
}

/// Get current timestamp in milliseconds since Unix epoch.
#[cfg(feature = "std")]
pub fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
