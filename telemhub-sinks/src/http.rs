//! HTTP sink that POSTs each payload to an ingest endpoint.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use telemhub_sinks::http::HttpSink;
//!
//! # fn main() -> Result<(), telemhub_sinks::AdapterError> {
//! let sink = HttpSink::builder()
//!     .endpoint("http://localhost:8080/ingest")
//!     .content_type("application/cbor")
//!     .timeout(Duration::from_secs(5))
//!     .build()?;
//! # let _ = sink;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use telemhub_core::{Sink, SinkError};
use tracing::debug;

use crate::AdapterError;

/// POSTs payloads to a fixed URL.
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: Client,
    endpoint: String,
    content_type: String,
    token: Option<String>,
}

impl HttpSink {
    /// Create a new builder for configuring the sink.
    pub fn builder() -> HttpSinkBuilder {
        HttpSinkBuilder::default()
    }

    /// Send one payload and check the response status.
    pub async fn post(&self, payload: Vec<u8>) -> Result<(), AdapterError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, &self.content_type)
            .body(payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AdapterError::Auth(format!("endpoint returned {}", status)));
        }
        if !status.is_success() {
            return Err(AdapterError::Http(format!("endpoint returned {}", status)));
        }

        debug!(endpoint = %self.endpoint, %status, "payload accepted");
        Ok(())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Sink for HttpSink {
    async fn publish(&self, payload: Vec<u8>) -> Result<(), SinkError> {
        Ok(self.post(payload).await?)
    }

    fn describe(&self) -> String {
        self.endpoint.clone()
    }
}

/// Builder for HttpSink.
#[derive(Debug, Default)]
pub struct HttpSinkBuilder {
    endpoint: Option<String>,
    content_type: Option<String>,
    token: Option<String>,
    timeout: Option<Duration>,
}

impl HttpSinkBuilder {
    /// Set the URL payloads are POSTed to. Required.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the `Content-Type` header (default: "application/json").
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the request timeout (default: 10 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the sink.
    pub fn build(self) -> Result<HttpSink, AdapterError> {
        let endpoint = self
            .endpoint
            .ok_or_else(|| AdapterError::InvalidConfig("endpoint is required".to_string()))?;
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(AdapterError::InvalidConfig(format!(
                "endpoint must be an http(s) URL: {}",
                endpoint
            )));
        }

        let client = Client::builder()
            .timeout(self.timeout.unwrap_or(Duration::from_secs(10)))
            .build()
            .map_err(|e| AdapterError::InvalidConfig(e.to_string()))?;

        Ok(HttpSink {
            client,
            endpoint,
            content_type: self
                .content_type
                .unwrap_or_else(|| "application/json".to_string()),
            token: self.token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Accept one request, answer with `status`, and return the raw request.
    async fn serve_once(status: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/ingest", listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = stream.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                status
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&request).to_string()
        });

        (url, server)
    }

    #[test]
    fn builder_requires_endpoint() {
        let err = HttpSink::builder().build().unwrap_err();
        assert!(matches!(err, AdapterError::InvalidConfig(_)));

        let err = HttpSink::builder().endpoint("ftp://x").build().unwrap_err();
        assert!(matches!(err, AdapterError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn posts_payload_with_headers() {
        let (url, server) = serve_once("200 OK").await;
        let sink = HttpSink::builder()
            .endpoint(url.clone())
            .bearer_token("s3cret")
            .build()
            .unwrap();

        sink.publish(br#"{"droneId":"drone123"}"#.to_vec())
            .await
            .unwrap();

        let request = server.await.unwrap();
        let lower = request.to_ascii_lowercase();
        assert!(request.starts_with("POST /ingest HTTP/1.1"));
        assert!(lower.contains("content-type: application/json"));
        assert!(lower.contains("authorization: bearer s3cret"));
        assert!(request.ends_with(r#"{"droneId":"drone123"}"#));
        assert_eq!(sink.describe(), url);
    }

    #[tokio::test]
    async fn unauthorized_is_rejected() {
        let (url, server) = serve_once("401 Unauthorized").await;
        let sink = HttpSink::builder().endpoint(url).build().unwrap();

        let err = sink.post(b"{}".to_vec()).await.unwrap_err();
        assert!(matches!(err, AdapterError::Auth(_)));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn server_error_maps_to_rejected_sink_error() {
        let (url, server) = serve_once("503 Service Unavailable").await;
        let sink = HttpSink::builder().endpoint(url).build().unwrap();

        let err = sink.publish(b"{}".to_vec()).await.unwrap_err();
        assert!(matches!(err, SinkError::Rejected(_)));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_unavailable() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let sink = HttpSink::builder()
            .endpoint(format!("http://{}/ingest", addr))
            .build()
            .unwrap();

        let err = sink.publish(b"{}".to_vec()).await.unwrap_err();
        assert!(matches!(err, SinkError::Unavailable(_)));
    }
}
