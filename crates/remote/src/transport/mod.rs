//! Wire transports for remote tool servers.
//!
//! A transport moves JSON-RPC frames; it knows nothing about tools. All three
//! report failures as [`RemoteToolError`] tagged with the server alias.

pub mod http;
pub mod sse;
pub mod stdio;

pub use http::StreamableHttpTransport;
pub use sse::SseTransport;
pub use stdio::StdioTransport;

use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use agentexec_core::error::RemoteToolError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, oneshot};
use tracing::debug;

pub type Result<T> = std::result::Result<T, RemoteToolError>;

#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Send a request and wait for its response.
    async fn request(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse>;

    /// Send a notification. Nothing comes back.
    async fn notify(&self, notification: JsonRpcNotification) -> Result<()>;

    /// Release the connection. Must be safe to call more than once.
    async fn close(&self);
}

/// Requests awaiting a response that arrives out of band.
#[derive(Clone, Default)]
pub(crate) struct Pending {
    waiting: Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>,
}

impl Pending {
    pub(crate) async fn register(&self, id: u64) -> oneshot::Receiver<JsonRpcResponse> {
        let (tx, rx) = oneshot::channel();
        self.waiting.lock().await.insert(id, tx);
        rx
    }

    pub(crate) async fn forget(&self, id: u64) {
        self.waiting.lock().await.remove(&id);
    }

    /// Hand a response to whoever is waiting for it.
    pub(crate) async fn resolve(&self, response: JsonRpcResponse) {
        let Some(id) = response.request_id() else {
            debug!("Ignoring server message without a request id");
            return;
        };
        match self.waiting.lock().await.remove(&id) {
            Some(tx) => {
                let _ = tx.send(response);
            }
            None => debug!(request_id = id, "No pending request for response"),
        }
    }

    /// Drop every waiter so their receivers observe a closed channel.
    pub(crate) async fn fail_all(&self) {
        self.waiting.lock().await.clear();
    }
}

pub(crate) fn header_map(alias: &str, headers: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            RemoteToolError::InvalidConfig {
                alias: alias.to_string(),
                reason: format!("invalid header name '{name}': {e}"),
            }
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| RemoteToolError::InvalidConfig {
            alias: alias.to_string(),
            reason: format!("invalid value for header '{name}': {e}"),
        })?;
        map.insert(name, value);
    }
    Ok(map)
}

pub(crate) fn request_error(alias: &str, err: reqwest::Error) -> RemoteToolError {
    if err.is_timeout() {
        return RemoteToolError::Timeout {
            alias: alias.to_string(),
        };
    }
    if let Some(status) = err.status() {
        return RemoteToolError::Http {
            alias: alias.to_string(),
            status: status.as_u16(),
        };
    }
    RemoteToolError::Connection {
        alias: alias.to_string(),
        cause: err.to_string(),
    }
}

pub(crate) fn protocol_error(alias: &str, message: impl Into<String>) -> RemoteToolError {
    RemoteToolError::Protocol {
        alias: alias.to_string(),
        message: message.into(),
    }
}

/// The `data` payloads of an event-stream body, one per event.
pub(crate) fn sse_data_events(body: &str) -> Vec<String> {
    let normalized = body.replace("\r\n", "\n");
    normalized
        .split("\n\n")
        .filter_map(|event| {
            let data: Vec<&str> = event
                .lines()
                .filter_map(|line| line.strip_prefix("data:"))
                .map(|line| line.strip_prefix(' ').unwrap_or(line))
                .collect();
            (!data.is_empty()).then(|| data.join("\n"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_event_stream_bodies() {
        let body = "event: message\r\ndata: {\"id\":1}\r\n\r\n: keep-alive\n\ndata: a\ndata: b\n\n";
        assert_eq!(sse_data_events(body), vec!["{\"id\":1}".to_string(), "a\nb".to_string()]);
        assert!(sse_data_events("").is_empty());
    }

    #[test]
    fn rejects_bad_headers() {
        let mut headers = BTreeMap::new();
        headers.insert("bad header".to_string(), "x".to_string());
        let err = header_map("calc", &headers).unwrap_err();
        assert!(matches!(err, RemoteToolError::InvalidConfig { ref alias, .. } if alias == "calc"));
    }

    #[tokio::test]
    async fn pending_routes_responses_by_id() {
        let pending = Pending::default();
        let rx = pending.register(3).await;
        let response: JsonRpcResponse =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": 3, "result": {"ok": true}}))
                .unwrap();
        pending.resolve(response).await;
        let delivered = rx.await.unwrap();
        assert_eq!(delivered.result, Some(json!({"ok": true})));

        let orphan = pending.register(4).await;
        pending.fail_all().await;
        assert!(orphan.await.is_err());
    }
}
