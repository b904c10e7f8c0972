//! SSE transport.
//!
//! A GET opens a long-lived event stream. The server's first `endpoint`
//! event names the URL that requests are POSTed to; responses arrive later
//! on the stream as `message` events and are matched to callers by id.

use super::{Pending, RemoteTransport, Result, header_map, protocol_error, request_error};
use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use agentexec_core::error::RemoteToolError;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, HeaderMap};
use reqwest_eventsource::{Event, EventSource};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

pub struct SseTransport {
    alias: String,
    endpoint: Url,
    client: reqwest::Client,
    headers: HeaderMap,
    pending: Pending,
    request_timeout: Duration,
    shutdown: CancellationToken,
}

type EndpointResult = std::result::Result<Url, RemoteToolError>;

fn stream_failure(alias: &str, err: reqwest_eventsource::Error) -> RemoteToolError {
    match err {
        reqwest_eventsource::Error::InvalidStatusCode(status, _) => RemoteToolError::Http {
            alias: alias.to_string(),
            status: status.as_u16(),
        },
        reqwest_eventsource::Error::Transport(e) => request_error(alias, e),
        other => RemoteToolError::Connection {
            alias: alias.to_string(),
            cause: other.to_string(),
        },
    }
}

impl SseTransport {
    /// Open the stream and wait for the server to announce its POST endpoint.
    pub async fn connect(
        alias: &str,
        url: &str,
        headers: &BTreeMap<String, String>,
        request_timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let stream_url = Url::parse(url).map_err(|e| RemoteToolError::InvalidConfig {
            alias: alias.to_string(),
            reason: format!("invalid URL '{url}': {e}"),
        })?;
        let headers = header_map(alias, headers)?;
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| RemoteToolError::Connection {
                alias: alias.to_string(),
                cause: e.to_string(),
            })?;

        let builder = client
            .get(stream_url.clone())
            .headers(headers.clone())
            .header(ACCEPT, "text/event-stream");
        let source = EventSource::new(builder).map_err(|e| RemoteToolError::Connection {
            alias: alias.to_string(),
            cause: e.to_string(),
        })?;

        let pending = Pending::default();
        let shutdown = CancellationToken::new();
        let (endpoint_tx, endpoint_rx) = oneshot::channel::<EndpointResult>();
        tokio::spawn(pump(
            alias.to_string(),
            stream_url,
            source,
            pending.clone(),
            shutdown.clone(),
            endpoint_tx,
        ));

        let announced = tokio::time::timeout(connect_timeout, endpoint_rx).await;
        let endpoint = match announced {
            Ok(Ok(Ok(endpoint))) => endpoint,
            Ok(Ok(Err(e))) => {
                shutdown.cancel();
                return Err(e);
            }
            Ok(Err(_)) => {
                shutdown.cancel();
                return Err(RemoteToolError::Connection {
                    alias: alias.to_string(),
                    cause: "event stream closed before an endpoint was announced".into(),
                });
            }
            Err(_) => {
                shutdown.cancel();
                return Err(RemoteToolError::Timeout {
                    alias: alias.to_string(),
                });
            }
        };
        debug!(alias = %alias, endpoint = %endpoint, "Remote tool server announced endpoint");

        Ok(Self {
            alias: alias.to_string(),
            endpoint,
            client,
            headers,
            pending,
            request_timeout,
            shutdown,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn post<T: Serialize + Sync>(&self, body: &T) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .headers(self.headers.clone())
            .timeout(self.request_timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| request_error(&self.alias, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(RemoteToolError::Http {
                alias: self.alias.clone(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

/// Drive the event stream until shutdown or the server goes away.
async fn pump(
    alias: String,
    stream_url: Url,
    mut source: EventSource,
    pending: Pending,
    shutdown: CancellationToken,
    endpoint_tx: oneshot::Sender<EndpointResult>,
) {
    let mut endpoint_tx = Some(endpoint_tx);
    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = source.next() => next,
        };
        match next {
            Some(Ok(Event::Open)) => debug!(alias = %alias, "Event stream opened"),
            Some(Ok(Event::Message(message))) => match message.event.as_str() {
                "endpoint" => {
                    let resolved = stream_url.join(message.data.trim()).map_err(|e| {
                        protocol_error(&alias, format!("invalid endpoint '{}': {e}", message.data))
                    });
                    if let Some(tx) = endpoint_tx.take() {
                        let _ = tx.send(resolved);
                    }
                }
                "message" | "" => match serde_json::from_str::<JsonRpcResponse>(&message.data) {
                    Ok(response) => pending.resolve(response).await,
                    Err(e) => debug!(alias = %alias, error = %e, "Skipping non-response event"),
                },
                other => debug!(alias = %alias, event = %other, "Ignoring event"),
            },
            Some(Err(reqwest_eventsource::Error::StreamEnded)) | None => break,
            Some(Err(e)) => {
                let failure = stream_failure(&alias, e);
                match endpoint_tx.take() {
                    Some(tx) => {
                        let _ = tx.send(Err(failure));
                    }
                    None => warn!(alias = %alias, error = %failure, "Remote event stream failed"),
                }
                break;
            }
        }
    }
    source.close();
    pending.fail_all().await;
}

#[async_trait]
impl RemoteTransport for SseTransport {
    async fn request(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        let id = request.id;
        let rx = self.pending.register(id).await;
        if let Err(e) = self.post(&request).await {
            self.pending.forget(id).await;
            return Err(e);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(RemoteToolError::Connection {
                alias: self.alias.clone(),
                cause: "event stream closed while awaiting a response".into(),
            }),
            Err(_) => {
                self.pending.forget(id).await;
                Err(RemoteToolError::Timeout {
                    alias: self.alias.clone(),
                })
            }
        }
    }

    async fn notify(&self, notification: JsonRpcNotification) -> Result<()> {
        self.post(&notification).await
    }

    async fn close(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
