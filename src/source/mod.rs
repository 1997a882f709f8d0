//! Upstream event sources for the relay.
//!
//! The hub consumes anything implementing [`EventSource`]; this module
//! provides the simulator and the NDJSON reader and picks one from settings.

mod simulator;
mod stream;

pub use simulator::{SimulatedSource, Simulator};
pub use stream::{parse_line, NdjsonSource};

use std::time::Duration;

use anyhow::{Context, Result};
use telemhub_core::EventSource;
use tracing::info;

use crate::config::{SourceKind, SourceSettings};

/// Create the event source described by `settings`.
pub async fn build_source(settings: &SourceSettings, tick: Duration) -> Result<Box<dyn EventSource>> {
    let source: Box<dyn EventSource> = match settings.kind {
        SourceKind::Simulator => {
            info!(tick_ms = tick.as_millis() as u64, seed = ?settings.seed, "using simulated telemetry");
            Box::new(SimulatedSource::new(tick, settings.seed))
        }
        SourceKind::Stdin => {
            info!("reading events from stdin");
            Box::new(NdjsonSource::stdin())
        }
        SourceKind::Connect => {
            let addr = settings
                .connect
                .as_deref()
                .context("source kind `connect` requires source.connect")?;
            let source = NdjsonSource::connect(addr)
                .await
                .with_context(|| format!("failed to connect to upstream {}", addr))?;
            info!(source = source.description(), "reading events from upstream");
            Box::new(source)
        }
    };
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_without_address_fails() {
        let settings = SourceSettings {
            kind: SourceKind::Connect,
            ..Default::default()
        };

        let err = build_source(&settings, Duration::from_millis(500))
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("source.connect"));
    }

    #[tokio::test(start_paused = true)]
    async fn simulator_is_the_default() {
        let mut source = build_source(&SourceSettings::default(), Duration::from_millis(500))
            .await
            .unwrap();
        assert_eq!(source.next_event().await.unwrap().category(), "position");
    }
}
