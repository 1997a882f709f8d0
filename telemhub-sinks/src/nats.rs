//! NATS sink publishing each payload to a subject.
//!
//! Plain mode publishes and flushes; JetStream mode waits for the stream's
//! acknowledgment, which gives at-least-once storage on the server side.
//!
//! ## Example
//!
//! ```rust,no_run
//! use telemhub_sinks::nats::NatsSink;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sink = NatsSink::builder()
//!         .url("nats://localhost:4222")
//!         .subject("telemetry.drone123")
//!         .jetstream(true)
//!         .build()
//!         .await?;
//!
//!     println!("publishing to {}", sink.subject());
//!     Ok(())
//! }
//! ```

use async_nats::jetstream;
use async_trait::async_trait;
use telemhub_core::{Sink, SinkError};

use crate::AdapterError;

enum Publisher {
    Core(async_nats::Client),
    JetStream(jetstream::Context),
}

/// Publishes payloads to a NATS subject.
pub struct NatsSink {
    publisher: Publisher,
    subject: String,
    url: String,
}

impl NatsSink {
    /// Create a new builder for configuring the sink.
    pub fn builder() -> NatsSinkBuilder {
        NatsSinkBuilder::default()
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    async fn send(&self, payload: Vec<u8>) -> Result<(), AdapterError> {
        match &self.publisher {
            Publisher::Core(client) => {
                client
                    .publish(self.subject.clone(), payload.into())
                    .await
                    .map_err(|e| AdapterError::Connection(e.to_string()))?;
                client
                    .flush()
                    .await
                    .map_err(|e| AdapterError::Connection(e.to_string()))?;
            }
            Publisher::JetStream(context) => {
                let ack = context
                    .publish(self.subject.clone(), payload.into())
                    .await
                    .map_err(|e| AdapterError::Connection(e.to_string()))?;
                ack.await.map_err(missing_ack)?;
            }
        }
        Ok(())
    }
}

fn missing_ack(err: impl std::fmt::Display) -> AdapterError {
    AdapterError::Connection(format!("no JetStream ack: {}", err))
}

#[async_trait]
impl Sink for NatsSink {
    async fn publish(&self, payload: Vec<u8>) -> Result<(), SinkError> {
        Ok(self.send(payload).await?)
    }

    fn describe(&self) -> String {
        format!("{}/{}", self.url, self.subject)
    }
}

impl std::fmt::Debug for NatsSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsSink")
            .field("url", &self.url)
            .field("subject", &self.subject)
            .field("jetstream", &matches!(self.publisher, Publisher::JetStream(_)))
            .finish()
    }
}

/// Builder for NatsSink.
#[derive(Debug, Default)]
pub struct NatsSinkBuilder {
    url: Option<String>,
    subject: Option<String>,
    credentials: Option<String>,
    jetstream: bool,
}

impl NatsSinkBuilder {
    /// Set the NATS server URL (default: "nats://localhost:4222").
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the subject payloads are published to (default: "telemetry").
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Set the path to a credentials file for authentication.
    pub fn credentials_file(mut self, path: impl Into<String>) -> Self {
        self.credentials = Some(path.into());
        self
    }

    /// Wait for a JetStream acknowledgment on every publish.
    pub fn jetstream(mut self, enabled: bool) -> Self {
        self.jetstream = enabled;
        self
    }

    /// Connect and build the sink.
    pub async fn build(self) -> Result<NatsSink, AdapterError> {
        let url = self
            .url
            .unwrap_or_else(|| "nats://localhost:4222".to_string());
        let subject = self.subject.unwrap_or_else(|| "telemetry".to_string());
        if subject.is_empty() || subject.contains(char::is_whitespace) {
            return Err(AdapterError::InvalidConfig(format!(
                "invalid subject: {:?}",
                subject
            )));
        }

        let client = if let Some(creds) = self.credentials {
            async_nats::ConnectOptions::new()
                .credentials_file(&creds)
                .await
                .map_err(|e| AdapterError::Auth(e.to_string()))?
                .connect(&url)
                .await
                .map_err(|e| AdapterError::Connection(e.to_string()))?
        } else {
            async_nats::connect(&url)
                .await
                .map_err(|e| AdapterError::Connection(e.to_string()))?
        };

        let publisher = if self.jetstream {
            Publisher::JetStream(jetstream::new(client))
        } else {
            Publisher::Core(client)
        };

        Ok(NatsSink {
            publisher,
            subject,
            url,
        })
    }
}
