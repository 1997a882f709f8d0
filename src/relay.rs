//! Wiring of a running relay: hub, source, sink and endpoints.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use telemhub_core::{Hub, HubHandle};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::RelayConfig;
use crate::duration::format_duration;
use crate::sink::build_sink;
use crate::source::build_source;
use crate::transport::{PushServer, QueryServer};

/// A started relay. Dropping it without [`shutdown`](Self::shutdown) leaves
/// the spawned tasks running.
#[derive(Debug)]
pub struct Relay {
    hub: Arc<Hub>,
    driver: HubHandle,
    stop_tx: watch::Sender<bool>,
    servers: Vec<JoinHandle<()>>,
    push_addr: Option<SocketAddr>,
    query_addr: Option<SocketAddr>,
}

impl Relay {
    /// Build everything described by `config` and start the driver.
    pub async fn start(config: &RelayConfig) -> Result<Self> {
        let hub_config = config.to_hub_config()?;
        let mut builder = Hub::builder().config(hub_config);
        if let Some(sink) = build_sink(&config.sink).await? {
            builder = builder.shared_sink(sink);
        }
        let hub = Arc::new(builder.build()?);

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut servers = Vec::new();

        let push_addr = match config.push.address() {
            Some(addr) => {
                let server = PushServer::bind(addr, hub.clone())
                    .await
                    .with_context(|| format!("failed to bind push endpoint {}", addr))?;
                let local = server.local_addr()?;
                servers.push(tokio::spawn(server.serve(stop_rx.clone())));
                Some(local)
            }
            None => None,
        };

        let query_addr = match config.query.address() {
            Some(addr) => {
                let server = QueryServer::bind(addr, hub.clone(), config.query.default_history_limit)
                    .await
                    .with_context(|| format!("failed to bind query endpoint {}", addr))?;
                let local = server.local_addr()?;
                servers.push(tokio::spawn(server.serve(stop_rx.clone())));
                Some(local)
            }
            None => None,
        };

        let source = build_source(&config.source, config.tick()?).await?;
        let driver = hub.start(source);

        info!(
            push = ?push_addr,
            query = ?query_addr,
            broadcast_interval = %format_duration(hub.config().broadcast_interval),
            publish_interval = %format_duration(hub.config().publish_interval),
            "relay started"
        );
        Ok(Self {
            hub,
            driver,
            stop_tx,
            servers,
            push_addr,
            query_addr,
        })
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    pub fn push_addr(&self) -> Option<SocketAddr> {
        self.push_addr
    }

    pub fn query_addr(&self) -> Option<SocketAddr> {
        self.query_addr
    }

    /// Resolves when the driver exits, e.g. at end of input.
    pub async fn finished(&self) {
        self.driver.finished().await;
    }

    /// Stop accepting clients, then stop the driver, which closes every
    /// connected listener.
    pub async fn shutdown(self) {
        let _ = self.stop_tx.send(true);
        self.driver.stop().await;
        for server in self.servers {
            let _ = server.await;
        }

        let broadcast = self.hub.broadcast_stats();
        info!(
            events = self.hub.store().applied_count(),
            broadcasts = broadcast.broadcasts,
            throttled = broadcast.throttled,
            dropped_listeners = broadcast.dropped_listeners,
            "relay stopped"
        );
        if let Some(publish) = self.hub.publish_stats() {
            info!(
                published = publish.published,
                failed = publish.failed,
                dropped = publish.dropped,
                "downstream totals"
            );
        }
    }
}
