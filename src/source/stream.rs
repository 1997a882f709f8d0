//! Newline-delimited JSON event source.
//!
//! Reads one JSON [`Event`] per line from any async byte stream, such as
//! standard input or a TCP connection to an upstream decoder.
//!
//! ```json
//! {"category":"battery","fields":{"voltage":12.4,"remaining":80}}
//! ```
//!
//! `received_at_ms` may be omitted, in which case the line is stamped with
//! the time it was read. Lines that fail to parse are logged and skipped.

use async_trait::async_trait;
use telemhub_core::{Event, EventSource};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// An [`EventSource`] fed by a background reader task.
///
/// The task parses lines as they arrive and hands events over a small
/// channel, so reading stays cancel-safe from the driver's point of view.
#[derive(Debug)]
pub struct NdjsonSource {
    receiver: mpsc::Receiver<Event>,
    description: String,
    reader: JoinHandle<()>,
}

impl NdjsonSource {
    /// Spawn a background task that reads events from `reader`.
    pub fn spawn<R>(reader: R, description: &str) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(64);
        let desc = description.to_string();

        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            let mut line_no = 0u64;

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        line_no += 1;
                        match parse_line(&line) {
                            Ok(Some(event)) => {
                                if tx.send(event).await.is_err() {
                                    // Receiver dropped
                                    break;
                                }
                            }
                            Ok(None) => {}
                            Err(e) => {
                                warn!(source = %desc, line = line_no, error = %e, "skipping malformed event");
                            }
                        }
                    }
                    Ok(None) => {
                        info!(source = %desc, lines = line_no, "input closed");
                        break;
                    }
                    Err(e) => {
                        warn!(source = %desc, error = %e, "read error");
                        break;
                    }
                }
            }
        });

        Self {
            receiver: rx,
            description: format!("ndjson: {}", description),
            reader,
        }
    }

    /// Read events from standard input.
    pub fn stdin() -> Self {
        Self::spawn(tokio::io::stdin(), "stdin")
    }

    /// Connect to `addr` and read events from the connection.
    pub async fn connect(addr: &str) -> std::io::Result<Self> {
        let stream = tokio::net::TcpStream::connect(addr).await?;
        debug!(%addr, "connected to upstream");
        Ok(Self::spawn(stream, addr))
    }

    /// Human-readable origin of the events.
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl Drop for NdjsonSource {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[async_trait]
impl EventSource for NdjsonSource {
    async fn next_event(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }
}

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<Event>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let event: Event = serde_json::from_str(line)?;
    Ok(Some(event.stamped()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[test]
    fn parses_and_stamps() {
        let event = parse_line(r#"{"category":"position","fields":{"lat":1.0,"lon":2.0}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(event.category(), "position");
        assert_eq!(event.get("lon").and_then(|v| v.as_f64()), Some(2.0));
        assert!(event.is_stamped());

        let event = parse_line(r#"{"category":"battery","fields":{"remaining":80},"received_at_ms":5}"#)
            .unwrap()
            .unwrap();
        assert_eq!(event.received_at_ms(), 5);
    }

    #[test]
    fn blank_and_malformed_lines() {
        assert!(parse_line("   ").unwrap().is_none());
        assert!(parse_line("{not json").is_err());
        assert!(parse_line(r#"{"fields":{}}"#).is_err());
    }

    #[tokio::test]
    async fn skips_bad_lines_and_ends_at_eof() {
        let input = concat!(
            r#"{"category":"position","fields":{"lat":1.0}}"#,
            "\n",
            "garbage\n",
            "\n",
            r#"{"category":"heartbeat","fields":{"armed":true,"mode":"GUIDED"}}"#,
            "\n",
        );
        let mut source = NdjsonSource::spawn(Cursor::new(input.as_bytes().to_vec()), "test");
        assert_eq!(source.description(), "ndjson: test");

        assert_eq!(source.next_event().await.unwrap().category(), "position");
        let heartbeat = source.next_event().await.unwrap();
        assert_eq!(heartbeat.get("mode").and_then(|v| v.as_str()), Some("GUIDED"));
        assert!(source.next_event().await.is_none());
    }

    #[tokio::test]
    async fn reads_from_tcp_upstream() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let upstream = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream
                .write_all(b"{\"category\":\"battery\",\"fields\":{\"remaining\":80}}\n")
                .await
                .unwrap();
        });

        let mut source = NdjsonSource::connect(&addr).await.unwrap();
        let event = source.next_event().await.unwrap();
        assert_eq!(event.get("remaining").and_then(|v| v.as_i64()), Some(80));

        upstream.await.unwrap();
        assert!(source.next_event().await.is_none());
    }
}
