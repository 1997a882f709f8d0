//! Downstream sinks for published snapshots.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use crate::error::SinkError;

/// Destination for serialized snapshots.
///
/// The publisher task calls `publish` with an already-encoded payload and
/// bounds every call with its own timeout, so implementations need not
/// enforce one.
#[async_trait]
pub trait Sink: Send + Sync + fmt::Debug {
    async fn publish(&self, payload: Vec<u8>) -> Result<(), SinkError>;

    /// Short human-readable target description for logs.
    fn describe(&self) -> String;
}

/// Appends each payload as one line to a file.
///
/// The file is created on first publish if missing.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    /// # Example
    ///
    /// ```rust
    /// use telemhub_core::FileSink;
    ///
    /// let sink = FileSink::new("snapshots.ndjson");
    /// ```
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl Sink for FileSink {
    async fn publish(&self, mut payload: Vec<u8>) -> Result<(), SinkError> {
        payload.push(b'\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&payload).await?;
        file.flush().await?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

/// Opens a connection per payload and writes it as a single line.
#[derive(Debug, Clone)]
pub struct TcpSink {
    addr: String,
}

impl TcpSink {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl Sink for TcpSink {
    async fn publish(&self, mut payload: Vec<u8>) -> Result<(), SinkError> {
        use tokio::net::TcpStream;

        let mut stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| SinkError::Unavailable(format!("{}: {}", self.addr, e)))?;
        payload.push(b'\n');
        stream.write_all(&payload).await?;
        stream.shutdown().await?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.addr)
    }
}

/// Hands payloads to an in-process channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Vec<u8>>,
}

impl ChannelSink {
    /// Create a channel sink and the receiver its payloads arrive on.
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Sink for ChannelSink {
    async fn publish(&self, payload: Vec<u8>) -> Result<(), SinkError> {
        self.tx.try_send(payload).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Rejected("channel full".into()),
            mpsc::error::TrySendError::Closed(_) => {
                SinkError::Unavailable("channel closed".into())
            }
        })
    }

    fn describe(&self) -> String {
        "channel".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.ndjson");
        let sink = FileSink::new(&path);

        sink.publish(br#"{"a":1}"#.to_vec()).await.unwrap();
        sink.publish(br#"{"a":2}"#.to_vec()).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents, "{\"a\":1}\n{\"a\":2}\n");
        assert!(sink.describe().starts_with("file:"));
    }

    #[tokio::test]
    async fn file_sink_reports_io_errors() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path().join("missing").join("out.ndjson"));

        let err = sink.publish(b"x".to_vec()).await.unwrap_err();
        assert!(matches!(err, SinkError::Io(_)));
    }

    #[tokio::test]
    async fn tcp_sink_sends_one_line() {
        use tokio::io::AsyncBufReadExt;
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let sink = TcpSink::new(addr.to_string());

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut lines = tokio::io::BufReader::new(stream).lines();
            lines.next_line().await.unwrap()
        });

        sink.publish(b"hello".to_vec()).await.unwrap();
        assert_eq!(server.await.unwrap().as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn tcp_sink_unreachable_is_unavailable() {
        use tokio::net::TcpListener;

        // Bind then drop to get a port nobody listens on.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let sink = TcpSink::new(addr.to_string());

        let err = sink.publish(b"x".to_vec()).await.unwrap_err();
        assert!(matches!(err, SinkError::Unavailable(_)));
    }

    #[tokio::test]
    async fn channel_sink_full_and_closed() {
        let (sink, mut rx) = ChannelSink::new(1);

        sink.publish(b"1".to_vec()).await.unwrap();
        assert!(matches!(
            sink.publish(b"2".to_vec()).await,
            Err(SinkError::Rejected(_))
        ));
        assert_eq!(rx.recv().await.unwrap(), b"1".to_vec());

        drop(rx);
        assert!(matches!(
            sink.publish(b"3".to_vec()).await,
            Err(SinkError::Unavailable(_))
        ));
    }
}
