//! REST + server-sent-events client for a hosted realtime relay
//!
//! Speaks the Firebase Realtime Database REST dialect: `PUT`, `PATCH` and
//! `DELETE` on `{base}/{path}.json`, and `GET` with
//! `Accept: text/event-stream` for push subscriptions.

use std::time::Duration;

use bytes::BytesMut;
use futures::StreamExt;
use reqwest::{header, Client};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{tree, RelayError, RelayPath, RelayStore, Subscription};
use crate::util::rate_limit::{create_limiter, Limiter};

/// Delay before a dropped subscription stream is reopened
const STREAM_REOPEN_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug)]
enum WriteOp {
    Put(RelayPath, Value),
    Patch(RelayPath, Value),
    Delete(RelayPath),
}

impl WriteOp {
    fn path(&self) -> &RelayPath {
        match self {
            WriteOp::Put(path, _) | WriteOp::Patch(path, _) | WriteOp::Delete(path) => path,
        }
    }
}

/// Connection details shared by the writer and the stream tasks
#[derive(Clone)]
struct Endpoint {
    client: Client,
    base_url: String,
    auth: Option<String>,
}

impl Endpoint {
    fn url(&self, path: &RelayPath) -> String {
        let mut url = format!("{}/{}.json", self.base_url.trim_end_matches('/'), path);
        if let Some(auth) = &self.auth {
            url.push_str("?auth=");
            url.push_str(auth);
        }
        url
    }

    async fn send(&self, op: &WriteOp) -> Result<(), RelayError> {
        let url = self.url(op.path());
        let request = match op {
            WriteOp::Put(_, value) => self.client.put(&url).json(value),
            WriteOp::Patch(_, value) => self.client.patch(&url).json(value),
            WriteOp::Delete(_) => self.client.delete(&url),
        };

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    /// Follow one event stream until it ends or the subscriber goes away
    async fn stream(
        &self,
        path: &RelayPath,
        tx: &mpsc::UnboundedSender<Option<Value>>,
    ) -> Result<(), RelayError> {
        let response = self
            .client
            .get(self.url(path))
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let mut body = response.bytes_stream();
        let mut parser = SseParser::default();
        let mut mirror = StreamMirror::default();

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            for event in parser.feed(&chunk) {
                if let Some(value) = mirror.apply(&event)? {
                    if tx.send(value).is_err() {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }
}

/// Relay client backed by the REST API
#[derive(Clone)]
pub struct HttpRelay {
    endpoint: Endpoint,
    writes: mpsc::UnboundedSender<WriteOp>,
}

impl HttpRelay {
    /// Must be called inside a tokio runtime; spawns the writer task
    pub fn new(base_url: &str, auth: Option<String>, writes_per_sec: u32) -> Self {
        let endpoint = Endpoint {
            client: Client::new(),
            base_url: base_url.to_string(),
            auth,
        };
        let (writes, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(endpoint.clone(), rx, create_limiter(writes_per_sec)));

        info!(base_url = %endpoint.base_url, "HTTP relay client ready");
        Self { endpoint, writes }
    }

    fn enqueue(&self, op: WriteOp) {
        if self.writes.send(op).is_err() {
            warn!(error = %RelayError::Closed, "Dropping relay write");
        }
    }
}

/// Writes leave in submission order, throttled to the configured quota
async fn run_writer(
    endpoint: Endpoint,
    mut rx: mpsc::UnboundedReceiver<WriteOp>,
    limiter: std::sync::Arc<Limiter>,
) {
    while let Some(op) = rx.recv().await {
        limiter.until_ready().await;
        if let Err(e) = endpoint.send(&op).await {
            warn!(path = %op.path(), error = %e, "Relay write failed");
        }
    }
    debug!("Relay writer stopped");
}

impl RelayStore for HttpRelay {
    fn set(&self, path: &RelayPath, value: Value) {
        self.enqueue(WriteOp::Put(path.clone(), value));
    }

    fn update(&self, path: &RelayPath, value: Value) {
        self.enqueue(WriteOp::Patch(path.clone(), value));
    }

    fn delete(&self, path: &RelayPath) {
        self.enqueue(WriteOp::Delete(path.clone()));
    }

    fn subscribe(&self, path: &RelayPath) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let endpoint = self.endpoint.clone();
        let path = path.clone();

        tokio::spawn(async move {
            while !tx.is_closed() {
                match endpoint.stream(&path, &tx).await {
                    Ok(()) => debug!(path = %path, "Relay stream ended"),
                    Err(e) => warn!(path = %path, error = %e, "Relay stream failed"),
                }
                if tx.is_closed() {
                    break;
                }
                tokio::time::sleep(STREAM_REOPEN_DELAY).await;
            }
        });
        rx
    }
}

/// One dispatched server-sent event
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

/// Incremental `text/event-stream` parser
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: BytesMut,
    event: String,
    data: Vec<String>,
}

impl SseParser {
    /// Feed raw bytes; returns every event completed by this chunk
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw = self.buffer.split_to(pos + 1);
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if !self.data.is_empty() || !self.event.is_empty() {
                    let event = if self.event.is_empty() {
                        "message".to_string()
                    } else {
                        std::mem::take(&mut self.event)
                    };
                    events.push(SseEvent {
                        event,
                        data: std::mem::take(&mut self.data).join("\n"),
                    });
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = line.split_once(':').unwrap_or((line, ""));
            let value = value.strip_prefix(' ').unwrap_or(value);
            match field {
                "event" => self.event = value.to_string(),
                "data" => self.data.push(value.to_string()),
                _ => {}
            }
        }
        events
    }
}

#[derive(Debug, Deserialize)]
struct StreamMessage {
    path: String,
    data: Value,
}

/// Local copy of the subscribed subtree rebuilt from `put`/`patch` events
#[derive(Debug, Default)]
struct StreamMirror {
    root: Value,
    last: Option<Option<Value>>,
}

impl StreamMirror {
    /// Apply an event; returns the full value when it changed
    fn apply(&mut self, event: &SseEvent) -> Result<Option<Option<Value>>, RelayError> {
        match event.event.as_str() {
            "put" | "patch" => {
                let message: StreamMessage = serde_json::from_str(&event.data)?;
                let path = RelayPath::parse(&message.path)?;
                if event.event == "put" {
                    tree::set(&mut self.root, &path, message.data);
                } else {
                    tree::merge(&mut self.root, &path, message.data);
                }
            }
            "keep-alive" => return Ok(None),
            "cancel" | "auth_revoked" => return Err(RelayError::Cancelled(event.data.clone())),
            other => {
                debug!(event = other, "Ignoring relay stream event");
                return Ok(None);
            }
        }

        let current = tree::get(&self.root, &RelayPath::root()).cloned();
        if self.last.as_ref() == Some(&current) {
            return Ok(None);
        }
        self.last = Some(current.clone());
        Ok(Some(current))
    }
}
