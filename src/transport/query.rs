//! Request/response query endpoint.
//!
//! | route | response |
//! |---|---|
//! | `GET /api/v1/telemetry` | current snapshot |
//! | `GET /api/v1/history?limit=N` | last `N` events, oldest first |
//! | `GET /health` | liveness plus a few counters |
//!
//! Everything else is `404 Not Found`.

use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use telemhub_core::{DriverState, Hub};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

const JSON: &str = "application/json";
const TEXT: &str = "text/plain";

/// Largest `limit` accepted by the history route.
pub const MAX_HISTORY_LIMIT: usize = 10_000;

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    state: &'static str,
    listeners: usize,
    events: u64,
}

/// HTTP/1 server answering snapshot and history queries.
#[derive(Debug)]
pub struct QueryServer {
    listener: TcpListener,
    hub: Arc<Hub>,
    default_limit: usize,
}

impl QueryServer {
    pub async fn bind(addr: &str, hub: Arc<Hub>, default_limit: usize) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            hub,
            default_limit,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve requests until `shutdown` turns true.
    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) {
        if let Ok(addr) = self.local_addr() {
            info!(%addr, "query endpoint listening");
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
                        let hub = self.hub.clone();
                        let default_limit = self.default_limit;
                        tokio::spawn(async move {
                            let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                                let hub = hub.clone();
                                async move { Ok::<_, Infallible>(handle_request(&req, &hub, default_limit)) }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(TokioIo::new(stream), service)
                                .await
                            {
                                debug!(%peer, error = %e, "query connection error");
                            }
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                    }
                },
            }
        }

        info!("query endpoint stopped");
    }
}

fn handle_request<B>(req: &Request<B>, hub: &Hub, default_limit: usize) -> Response<Full<Bytes>> {
    if req.method() != Method::GET {
        return respond(StatusCode::METHOD_NOT_ALLOWED, TEXT, "Method Not Allowed");
    }

    match req.uri().path() {
        "/api/v1/telemetry" => json(&hub.snapshot()),
        "/api/v1/history" => match parse_limit(req.uri().query(), default_limit) {
            Ok(limit) => json(&hub.history(limit)),
            Err(msg) => respond(StatusCode::BAD_REQUEST, TEXT, msg),
        },
        "/health" => json(&Health {
            status: "ok",
            state: match hub.state() {
                DriverState::Idle => "idle",
                DriverState::Processing => "processing",
            },
            listeners: hub.listener_count(),
            events: hub.store().applied_count(),
        }),
        _ => respond(StatusCode::NOT_FOUND, TEXT, "Not Found"),
    }
}

/// Extract `limit` from a query string, capped at [`MAX_HISTORY_LIMIT`].
fn parse_limit(query: Option<&str>, default_limit: usize) -> Result<usize, String> {
    let value = query
        .into_iter()
        .flat_map(|q| q.split('&'))
        .find_map(|pair| pair.strip_prefix("limit="));

    match value {
        None => Ok(default_limit.min(MAX_HISTORY_LIMIT)),
        Some(v) => v
            .parse::<usize>()
            .map(|n| n.min(MAX_HISTORY_LIMIT))
            .map_err(|_| format!("invalid limit: {:?}", v)),
    }
}

fn json<T: Serialize + ?Sized>(value: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(value) {
        Ok(body) => respond(StatusCode::OK, JSON, body),
        Err(e) => {
            warn!(error = %e, "failed to serialize response");
            respond(StatusCode::INTERNAL_SERVER_ERROR, TEXT, "Internal Server Error")
        }
    }
}

fn respond(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}
