//! Construction of the downstream sink from settings.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use telemhub_core::{FileSink, Sink, TcpSink};
use tracing::info;

use crate::config::{SinkKind, SinkSettings};

/// Build the configured sink, or `None` when downstream publishing is off.
pub async fn build_sink(settings: &SinkSettings) -> Result<Option<Arc<dyn Sink>>> {
    let target = || {
        settings
            .target
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| anyhow!("sink kind {:?} requires sink.target", settings.kind))
    };

    let sink: Arc<dyn Sink> = match settings.kind {
        SinkKind::None => return Ok(None),
        SinkKind::File => Arc::new(FileSink::new(target()?)),
        SinkKind::Tcp => Arc::new(TcpSink::new(target()?)),
        SinkKind::Http => http_sink(settings, target()?)?,
        SinkKind::Nats => nats_sink(settings, target()?).await?,
    };

    info!(sink = %sink.describe(), "downstream sink configured");
    Ok(Some(sink))
}

#[cfg(feature = "http-sink")]
fn http_sink(settings: &SinkSettings, endpoint: String) -> Result<Arc<dyn Sink>> {
    use telemhub_sinks::http::HttpSink;

    let mut builder = HttpSink::builder()
        .endpoint(endpoint)
        .content_type(settings.payload_format().content_type());
    if let Some(token) = &settings.token {
        builder = builder.bearer_token(token.clone());
    }
    Ok(Arc::new(builder.build()?))
}

#[cfg(not(feature = "http-sink"))]
fn http_sink(_settings: &SinkSettings, _endpoint: String) -> Result<Arc<dyn Sink>> {
    anyhow::bail!("HTTP sink support not compiled in (enable the `http-sink` feature)")
}

#[cfg(feature = "nats-sink")]
async fn nats_sink(settings: &SinkSettings, url: String) -> Result<Arc<dyn Sink>> {
    use telemhub_sinks::nats::NatsSink;

    let sink = NatsSink::builder()
        .url(url)
        .subject(settings.subject.clone())
        .jetstream(settings.jetstream)
        .build()
        .await?;
    Ok(Arc::new(sink))
}

#[cfg(not(feature = "nats-sink"))]
async fn nats_sink(_settings: &SinkSettings, _url: String) -> Result<Arc<dyn Sink>> {
    anyhow::bail!("NATS sink support not compiled in (enable the `nats-sink` feature)")
}
