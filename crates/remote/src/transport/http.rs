//! Streamable HTTP transport.
//!
//! Every frame is a POST to one endpoint. Responses come back either as a
//! JSON body or as a short event stream whose `data` lines carry the
//! JSON-RPC response. A session id handed out on `initialize` is echoed on
//! every later request and released with a DELETE on close.

use super::{RemoteTransport, Result, header_map, protocol_error, request_error, sse_data_events};
use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use agentexec_core::error::RemoteToolError;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

const SESSION_HEADER: &str = "mcp-session-id";

pub struct StreamableHttpTransport {
    alias: String,
    url: String,
    client: reqwest::Client,
    headers: HeaderMap,
    session_id: Mutex<Option<String>>,
}

impl StreamableHttpTransport {
    pub fn new(
        alias: &str,
        url: &str,
        headers: &BTreeMap<String, String>,
        request_timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| RemoteToolError::Connection {
                alias: alias.to_string(),
                cause: e.to_string(),
            })?;
        Ok(Self {
            alias: alias.to_string(),
            url: url.to_string(),
            client,
            headers: header_map(alias, headers)?,
            session_id: Mutex::new(None),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn session_id(&self) -> Option<String> {
        self.session_id.lock().ok().and_then(|guard| guard.clone())
    }

    async fn post<T: Serialize + Sync>(&self, body: &T) -> Result<reqwest::Response> {
        let mut request = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .header(ACCEPT, "application/json, text/event-stream")
            .json(body);
        if let Some(session) = self.session_id() {
            request = request.header(SESSION_HEADER, session);
        }

        let response = request
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

        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            && let Ok(mut guard) = self.session_id.lock()
        {
            *guard = Some(session.to_string());
        }
        Ok(response)
    }

    fn decode(&self, id: u64, is_event_stream: bool, body: &str) -> Result<JsonRpcResponse> {
        if !is_event_stream {
            return serde_json::from_str(body)
                .map_err(|e| protocol_error(&self.alias, format!("invalid JSON-RPC response: {e}")));
        }
        sse_data_events(body)
            .iter()
            .filter_map(|data| serde_json::from_str::<JsonRpcResponse>(data).ok())
            .find(|response| response.request_id() == Some(id))
            .ok_or_else(|| protocol_error(&self.alias, "event stream ended without a response"))
    }
}

#[async_trait]
impl RemoteTransport for StreamableHttpTransport {
    async fn request(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        let response = self.post(&request).await?;
        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/event-stream"));
        let body = response
            .text()
            .await
            .map_err(|e| request_error(&self.alias, e))?;
        self.decode(request.id, is_event_stream, &body)
    }

    async fn notify(&self, notification: JsonRpcNotification) -> Result<()> {
        self.post(&notification).await.map(|_| ())
    }

    async fn close(&self) {
        let Some(session) = self.session_id.lock().ok().and_then(|mut guard| guard.take()) else {
            return;
        };
        let result = self
            .client
            .delete(&self.url)
            .headers(self.headers.clone())
            .header(SESSION_HEADER, session)
            .send()
            .await;
        if let Err(e) = result {
            debug!(alias = %self.alias, error = %e, "Failed to release remote session");
        }
    }
}
