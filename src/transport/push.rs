//! Push subscription endpoint.
//!
//! Every accepted TCP connection becomes a hub listener: it receives the
//! current snapshot on connect (when greeting is enabled) and then one JSON
//! line per broadcast. Anything the client sends is ignored; closing the
//! connection unsubscribes it.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use telemhub_core::{Hub, ListenerHandle, Snapshot};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// TCP server streaming snapshots to connected clients.
#[derive(Debug)]
pub struct PushServer {
    listener: TcpListener,
    hub: Arc<Hub>,
}

impl PushServer {
    pub async fn bind(addr: &str, hub: Arc<Hub>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, hub })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept clients until `shutdown` turns true.
    ///
    /// Client tasks are left running; they finish once the hub drops their
    /// listener on shutdown or the client disconnects.
    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) {
        if let Ok(addr) = self.local_addr() {
            info!(%addr, "push endpoint listening");
        }

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tokio::spawn(handle_client(stream, peer, self.hub.clone()));
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                    }
                },
            }
        }

        info!("push endpoint stopped");
    }
}

async fn handle_client(stream: TcpStream, peer: SocketAddr, hub: Arc<Hub>) {
    let (handle, mut snapshots) = ListenerHandle::channel(hub.config().listener_buffer);
    let id = handle.id();
    if !hub.register(handle) {
        warn!(%peer, "client refused on registration");
        return;
    }
    info!(%peer, listener = %id, "client connected");

    let (mut reader, mut writer) = stream.into_split();
    let mut buf = [0u8; 256];

    loop {
        tokio::select! {
            snapshot = snapshots.recv() => match snapshot {
                Some(snapshot) => {
                    if let Err(e) = write_snapshot(&mut writer, &snapshot).await {
                        debug!(%peer, error = %e, "write failed");
                        break;
                    }
                }
                // The hub dropped us, either for lagging or on shutdown.
                None => break,
            },
            read = reader.read(&mut buf) => match read {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            },
        }
    }

    hub.unregister(id);
    info!(%peer, listener = %id, "client disconnected");
}

async fn write_snapshot<W>(writer: &mut W, snapshot: &Snapshot) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = serde_json::to_vec(snapshot)?;
    line.push(b'\n');
    writer.write_all(&line).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use telemhub_core::Event;
    use tokio::io::{AsyncBufReadExt, BufReader};

    async fn start(hub: Arc<Hub>) -> (SocketAddr, watch::Sender<bool>) {
        let server = PushServer::bind("127.0.0.1:0", hub).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(server.serve(stop_rx));
        (addr, stop_tx)
    }

    async fn wait_for_listeners(hub: &Hub, count: usize) {
        for _ in 0..200 {
            if hub.listener_count() == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {} listeners, have {}", count, hub.listener_count());
    }

    #[tokio::test]
    async fn client_is_greeted_then_streamed() {
        let hub = Arc::new(
            Hub::builder()
                .broadcast_interval(Duration::ZERO)
                .build()
                .unwrap(),
        );
        let (addr, _stop) = start(hub.clone()).await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let mut lines = BufReader::new(stream).lines();

        let greeting: Snapshot = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert!(greeting.is_empty());
        wait_for_listeners(&hub, 1).await;

        hub.ingest(
            Event::builder("position")
                .field("lat", 1.0)
                .field("lon", 2.0)
                .build(),
        );

        let update: Snapshot = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(update.field("position", "lat").and_then(|v| v.as_f64()), Some(1.0));
    }

    #[tokio::test]
    async fn disconnect_unregisters() {
        let hub = Arc::new(Hub::new());
        let (addr, _stop) = start(hub.clone()).await;

        let stream = TcpStream::connect(addr).await.unwrap();
        wait_for_listeners(&hub, 1).await;

        drop(stream);
        wait_for_listeners(&hub, 0).await;
    }

    #[tokio::test]
    async fn hub_shutdown_closes_clients() {
        let hub = Arc::new(Hub::new());
        let (addr, stop) = start(hub.clone()).await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let mut lines = BufReader::new(stream).lines();
        lines.next_line().await.unwrap().unwrap();
        wait_for_listeners(&hub, 1).await;

        hub.shutdown();
        stop.send(true).unwrap();

        // Final snapshot, then end of stream.
        assert!(lines.next_line().await.unwrap().is_some());
        assert!(lines.next_line().await.unwrap().is_none());
    }
}
