//! An initialized JSON-RPC session with one remote tool server.

use crate::config::{ConnectionSpec, Target, TransportKind, alternate_url};
use crate::protocol::{
    CLIENT_NAME, CallToolResult, JsonRpcNotification, JsonRpcRequest, ListToolsResult,
    PROTOCOL_VERSION, RemoteToolInfo,
};
use crate::transport::stdio::StdioCommand;
use crate::transport::{
    RemoteTransport, Result, SseTransport, StdioTransport, StreamableHttpTransport, protocol_error,
};
use agentexec_core::error::RemoteToolError;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// Upper bound on `tools/list` pages followed for one server.
const MAX_LIST_PAGES: usize = 50;

pub struct RemoteSession {
    alias: String,
    transport: Box<dyn RemoteTransport>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for RemoteSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSession")
            .field("alias", &self.alias)
            .finish()
    }
}

impl RemoteSession {
    /// Connect and run the `initialize` handshake within the connect timeout.
    ///
    /// URL transports that answer 404 on their canonical path get exactly
    /// one more attempt at the alternate path.
    pub async fn open(spec: &ConnectionSpec) -> Result<Self> {
        tokio::time::timeout(spec.connect_timeout, Self::connect(spec))
            .await
            .map_err(|_| RemoteToolError::Timeout {
                alias: spec.alias.clone(),
            })?
    }

    async fn connect(spec: &ConnectionSpec) -> Result<Self> {
        let url = match &spec.server.target {
            Target::Command {
                command,
                args,
                env,
                cwd,
            } => {
                let launch = StdioCommand {
                    command: command.clone(),
                    args: args.clone(),
                    env: env.clone(),
                    cwd: cwd.clone(),
                };
                let transport = StdioTransport::spawn(&spec.alias, &launch, spec.request_timeout)?;
                return Self::handshake(&spec.alias, Box::new(transport)).await;
            }
            Target::Url(url) => url,
        };

        match Self::open_url(spec, url).await {
            Err(RemoteToolError::Http { status: 404, .. }) => {
                let Some(alternate) = alternate_url(spec.server.transport, url) else {
                    return Err(RemoteToolError::Http {
                        alias: spec.alias.clone(),
                        status: 404,
                    });
                };
                info!(
                    alias = %spec.alias,
                    url = %url,
                    alternate = %alternate,
                    "Remote tool server path not found, retrying alternate path"
                );
                Self::open_url(spec, &alternate).await
            }
            other => other,
        }
    }

    async fn open_url(spec: &ConnectionSpec, url: &str) -> Result<Self> {
        let headers = spec.headers();
        debug!(alias = %spec.alias, url = %url, transport = %spec.server.transport, "Connecting to remote tool server");
        let transport: Box<dyn RemoteTransport> = match spec.server.transport {
            TransportKind::Sse => Box::new(
                SseTransport::connect(
                    &spec.alias,
                    url,
                    &headers,
                    spec.request_timeout,
                    spec.connect_timeout,
                )
                .await?,
            ),
            TransportKind::StreamableHttp | TransportKind::Stdio => {
                Box::new(StreamableHttpTransport::new(
                    &spec.alias,
                    url,
                    &headers,
                    spec.request_timeout,
                    spec.connect_timeout,
                )?)
            }
        };
        Self::handshake(&spec.alias, transport).await
    }

    async fn handshake(alias: &str, transport: Box<dyn RemoteTransport>) -> Result<Self> {
        let session = Self {
            alias: alias.to_string(),
            transport,
            next_id: AtomicU64::new(1),
        };
        let initialized = session.initialize().await;

        match initialized {
            Ok(()) => Ok(session),
            Err(e) => {
                session.close().await;
                Err(e)
            }
        }
    }

    async fn initialize(&self) -> Result<()> {
        let init = self
            .call(
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": CLIENT_NAME,
                        "version": env!("CARGO_PKG_VERSION"),
                    }
                }),
            )
            .await?;
        let server = init
            .get("serverInfo")
            .and_then(|s| s.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        debug!(alias = %self.alias, server = %server, "Remote tool server initialized");
        self.transport
            .notify(JsonRpcNotification::new("notifications/initialized"))
            .await
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// One request/response round trip; JSON-RPC errors become protocol errors.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let response = self
            .transport
            .request(JsonRpcRequest::new(id, method, Some(params)))
            .await?;
        if let Some(error) = response.error {
            return Err(protocol_error(
                &self.alias,
                format!("{method} failed ({}): {}", error.code, error.message),
            ));
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    async fn call_as<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let result = self.call(method, params).await?;
        serde_json::from_value(result)
            .map_err(|e| protocol_error(&self.alias, format!("malformed {method} result: {e}")))
    }

    /// Every tool the server offers, following pagination cursors.
    pub async fn list_tools(&self) -> Result<Vec<RemoteToolInfo>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_LIST_PAGES {
            let params = match &cursor {
                Some(c) => json!({ "cursor": c }),
                None => json!({}),
            };
            let page: ListToolsResult = self.call_as("tools/list", params).await?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(tools)
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        self.call_as("tools/call", json!({ "name": name, "arguments": arguments }))
            .await
    }

    pub async fn close(&self) {
        self.transport.close().await;
    }
}
