//! Push stream client.
//!
//! `StreamClient::open_stream` starts one reader task per connection. The task
//! frames the SSE body, decodes each payload and forwards events over a
//! channel. Decode failures are reported and skipped; anything that ends
//! the body ends the connection with a single `Broken` event.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use guidewatch_protocol::{new_request_id, MonitorSnapshot, Snapshot};
use reqwest::header::{HeaderValue, ACCEPT};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::common_headers;
use crate::config::Config;
use crate::error::{ClientError, StreamError};
use crate::sse::SseParser;

const EVENT_BUFFER: usize = 64;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Payloads that can arrive on a stream
pub trait Decode: Sized + Send + 'static {
    fn decode(payload: &str) -> Result<Self, serde_json::Error>;
}

impl Decode for Snapshot {
    fn decode(payload: &str) -> Result<Self, serde_json::Error> {
        Snapshot::decode(payload)
    }
}

impl Decode for MonitorSnapshot {
    fn decode(payload: &str) -> Result<Self, serde_json::Error> {
        MonitorSnapshot::decode(payload)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent<T> {
    Snapshot(T),
    /// Payload did not decode; the connection stays open.
    DecodeFailed {
        error: String,
    },
    /// Terminal. No further events follow on this connection.
    Broken {
        reason: String,
    },
}

/// Owns the reader task of one connection. Dropping it closes the stream.
#[derive(Debug)]
pub struct StreamHandle {
    id: u64,
    task: Option<JoinHandle<()>>,
}

impl StreamHandle {
    pub fn new(id: u64, task: JoinHandle<()>) -> Self {
        Self {
            id,
            task: Some(task),
        }
    }

    /// Handle without a reader task, for feeds driven by hand
    #[cfg(test)]
    pub fn detached(id: u64) -> Self {
        Self { id, task: None }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Abort the reader. Safe to call any number of times.
    pub fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!(
                component = "stream",
                event = "stream.connection.closed",
                connection_id = self.id,
                "Stream closed"
            );
        }
    }

    #[allow(dead_code)]
    pub fn is_closed(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.close();
    }
}

pub struct StreamConnection<T> {
    pub handle: StreamHandle,
    pub events: mpsc::Receiver<StreamEvent<T>>,
}

pub fn next_connection_id() -> u64 {
    NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)
}

/// Source of operator snapshots. Implemented by `StreamClient`.
pub trait SnapshotFeed: Send + Sync + 'static {
    fn open(&self, path: &str) -> StreamConnection<Snapshot>;
}

#[derive(Clone)]
pub struct StreamClient {
    http: reqwest::Client,
    base_url: String,
    lang: String,
}

impl StreamClient {
    /// The stream has no overall timeout, only a connect timeout.
    pub fn new(config: &Config) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .default_headers(common_headers(config)?)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: config.sse_url.clone(),
            lang: config.lang.clone(),
        })
    }

    pub fn open_stream<T: Decode>(&self, path: &str) -> StreamConnection<T> {
        let id = next_connection_id();
        let (tx, events) = mpsc::channel(EVENT_BUFFER);
        let url = format!("{}{}", self.base_url, path);

        info!(
            component = "stream",
            event = "stream.connection.opening",
            connection_id = id,
            url = %url,
            "Opening stream"
        );

        let request = self
            .http
            .get(&url)
            .query(&[("lang", self.lang.as_str())])
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"))
            .header("x-request-id", new_request_id());

        let task = tokio::spawn(async move {
            match pump::<T>(request, id, &tx).await {
                // Consumer went away; nobody to tell.
                Ok(()) => {}
                Err(e) => {
                    warn!(
                        component = "stream",
                        event = "stream.connection.broken",
                        connection_id = id,
                        error = %e,
                        "Stream broke"
                    );
                    let _ = tx
                        .send(StreamEvent::Broken {
                            reason: e.to_string(),
                        })
                        .await;
                }
            }
        });

        StreamConnection {
            handle: StreamHandle::new(id, task),
            events,
        }
    }
}

impl SnapshotFeed for StreamClient {
    fn open(&self, path: &str) -> StreamConnection<Snapshot> {
        self.open_stream(path)
    }
}

/// Returns `Ok` only when the receiver is gone.
async fn pump<T: Decode>(
    request: reqwest::RequestBuilder,
    id: u64,
    tx: &mpsc::Sender<StreamEvent<T>>,
) -> Result<(), StreamError> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(StreamError::Status(status.as_u16()));
    }

    info!(
        component = "stream",
        event = "stream.connection.open",
        connection_id = id,
        "Stream connected"
    );

    let mut body = response.bytes_stream();
    let mut parser = SseParser::new();
    while let Some(chunk) = body.next().await {
        let chunk: Bytes = chunk.map_err(|e| StreamError::Body(e.to_string()))?;
        for frame in parser.push(&chunk) {
            let event = match T::decode(&frame.data) {
                Ok(snapshot) => StreamEvent::Snapshot(snapshot),
                Err(e) => {
                    warn!(
                        component = "stream",
                        event = "stream.payload.decode_failed",
                        connection_id = id,
                        error = %e,
                        sse_event = ?frame.event,
                        payload_len = frame.data.len(),
                        "Dropping malformed stream payload"
                    );
                    StreamEvent::DecodeFailed {
                        error: e.to_string(),
                    }
                }
            };
            if tx.send(event).await.is_err() {
                return Ok(());
            }
        }
    }
    Err(StreamError::Ended)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::CONTENT_TYPE;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client_for(base: &str) -> StreamClient {
        StreamClient::new(&Config::for_tests(base)).unwrap()
    }

    #[tokio::test]
    async fn delivers_snapshots_then_breaks_at_end_of_body() {
        let body = concat!(
            ": keep-alive\n\n",
            "data: {\"data\":{\"operatorGuides\":[{\"guideId\":1}]},\"message\":\"\"}\n\n",
            "data: {not json\n\n",
            "data: {\"data\":{\"operatorGuides\":[{\"guideId\":1},{\"guideId\":2}]},\"message\":\"\"}\n\n",
        );
        let router = Router::new().route(
            "/operator/guides",
            get(move || async move { ([(CONTENT_TYPE, "text/event-stream")], body) }),
        );
        let base = serve(router).await;

        let mut conn = client_for(&base).open_stream::<Snapshot>("/operator/guides");
        let mut events = Vec::new();
        while let Some(event) = conn.events.recv().await {
            events.push(event);
        }

        assert_eq!(events.len(), 4);
        assert!(matches!(&events[0], StreamEvent::Snapshot(s) if s.guides.as_ref().map(Vec::len) == Some(1)));
        assert!(matches!(&events[1], StreamEvent::DecodeFailed { .. }));
        assert!(matches!(&events[2], StreamEvent::Snapshot(s) if s.guides.as_ref().map(Vec::len) == Some(2)));
        assert!(matches!(&events[3], StreamEvent::Broken { .. }));
    }

    #[tokio::test]
    async fn rejected_stream_is_broken() {
        let router = Router::new().route(
            "/operator/guides",
            get(|| async { StatusCode::UNAUTHORIZED }),
        );
        let base = serve(router).await;

        let mut conn = client_for(&base).open_stream::<Snapshot>("/operator/guides");
        match conn.events.recv().await {
            Some(StreamEvent::Broken { reason }) => assert!(reason.contains("401")),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(conn.events.recv().await.is_none());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_silences_the_stream() {
        let router = Router::new().route(
            "/operator/guides",
            get(|| async {
                let body = axum::body::Body::from_stream(futures::stream::pending::<
                    Result<Bytes, std::io::Error>,
                >());
                ([(CONTENT_TYPE, "text/event-stream")], body)
            }),
        );
        let base = serve(router).await;

        let mut conn = client_for(&base).open_stream::<Snapshot>("/operator/guides");
        conn.handle.close();
        conn.handle.close();
        assert!(conn.handle.is_closed());
        // Aborted task drops its sender without emitting anything.
        assert!(conn.events.recv().await.is_none());
    }

    #[test]
    fn connection_ids_increase() {
        let a = next_connection_id();
        let b = next_connection_id();
        assert!(b > a);
    }
}
