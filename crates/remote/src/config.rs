//! Remote tool server connection settings.
//!
//! Agents carry a free-form map of server aliases to connection maps. Each
//! map is sanitized into a [`ServerConfig`] before anything is contacted:
//! empty values are dropped, the transport is normalized (or inferred from
//! the keys present), and URL paths are rewritten to the suffix each
//! transport expects.

use agentexec_config::{AppConfig, ExecutionConfig, RemoteConfig};
use agentexec_core::error::RemoteToolError;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

const SSE_SUFFIX: &str = "/mcp/sse";
const STREAM_SUFFIX: &str = "/mcp/stream";

/// The wire transport a remote server is reached over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// A local child process speaking newline-delimited JSON-RPC.
    Stdio,
    /// A long-lived event stream plus a POST endpoint announced on it.
    Sse,
    /// Request/response HTTP where each POST may answer in JSON or as an event stream.
    StreamableHttp,
}

impl TransportKind {
    /// Normalize a configured transport name. Unknown names yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "stdio" | "process" | "command" => Some(Self::Stdio),
            "sse" | "server_sent_events" | "event_stream" | "streaming" => Some(Self::Sse),
            "streamable_http" | "streamablehttp" | "streamable" | "http" | "https" => {
                Some(Self::StreamableHttp)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::Sse => "sse",
            Self::StreamableHttp => "streamable_http",
        }
    }

    pub fn is_url_based(&self) -> bool {
        !matches!(self, Self::Stdio)
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the server lives.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Url(String),
    Command {
        command: String,
        args: Vec<String>,
        env: BTreeMap<String, String>,
        cwd: Option<PathBuf>,
    },
}

/// A sanitized server entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub transport: TransportKind,
    pub target: Target,
    pub headers: BTreeMap<String, String>,
    pub token: Option<String>,
    pub timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
}

impl ServerConfig {
    pub fn url(&self) -> Option<&str> {
        match &self.target {
            Target::Url(url) => Some(url),
            Target::Command { .. } => None,
        }
    }
}

/// Default timeouts applied when a server entry does not set its own.
///
/// `discovery_budget` bounds connecting to one server and listing its tools,
/// whatever the per-server timeouts say. It is half the execution timeout,
/// so a silent server costs its tools and never the whole run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemoteSettings {
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub discovery_budget: Duration,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for RemoteSettings {
    fn from(config: &AppConfig) -> Self {
        Self::new(&config.remote, &config.execution)
    }
}

impl RemoteSettings {
    pub fn new(remote: &RemoteConfig, execution: &ExecutionConfig) -> Self {
        Self {
            request_timeout: remote.request_timeout(),
            connect_timeout: remote.connect_timeout(),
            discovery_budget: execution.timeout() / 2,
        }
    }
}

/// Everything needed to open one server connection.
#[derive(Debug, Clone)]
pub struct ConnectionSpec {
    pub alias: String,
    pub server: ServerConfig,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl ConnectionSpec {
    pub fn new(alias: impl Into<String>, server: ServerConfig, defaults: &RemoteSettings) -> Self {
        let request_timeout = server.timeout.unwrap_or(defaults.request_timeout);
        let connect_timeout = server.connect_timeout.unwrap_or(defaults.connect_timeout);
        Self {
            alias: alias.into(),
            server,
            request_timeout,
            connect_timeout,
        }
    }

    /// Explicit headers with `Authorization: Bearer <token>` layered on top.
    pub fn headers(&self) -> BTreeMap<String, String> {
        let mut headers = self.server.headers.clone();
        if let Some(token) = &self.server.token {
            headers.retain(|name, _| !name.eq_ignore_ascii_case("authorization"));
            headers.insert("Authorization".into(), format!("Bearer {token}"));
        }
        headers
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn invalid(alias: &str, reason: impl Into<String>) -> RemoteToolError {
    RemoteToolError::InvalidConfig {
        alias: alias.to_string(),
        reason: reason.into(),
    }
}

fn infer_transport(map: &Map<String, Value>) -> String {
    if let Some(url) = map.get("url").and_then(Value::as_str) {
        let normalized = url.trim_end_matches('/').to_lowercase();
        if normalized.ends_with(SSE_SUFFIX) {
            return "sse".into();
        }
        return "streamable_http".into();
    }
    if map.contains_key("command") || map.contains_key("args") {
        return "stdio".into();
    }
    "streamable_http".into()
}

fn string_map(alias: &str, key: &str, value: Option<&Value>) -> Result<BTreeMap<String, String>, RemoteToolError> {
    let Some(value) = value else {
        return Ok(BTreeMap::new());
    };
    let object = value
        .as_object()
        .ok_or_else(|| invalid(alias, format!("'{key}' must be a mapping")))?;
    Ok(object
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| {
            let text = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), text)
        })
        .collect())
}

fn string_list(alias: &str, value: Option<&Value>) -> Result<Vec<String>, RemoteToolError> {
    match value {
        None => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(vec![s.clone()]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                Value::Number(n) => Ok(n.to_string()),
                _ => Err(invalid(alias, "'args' must be a list of strings")),
            })
            .collect(),
        Some(_) => Err(invalid(alias, "'args' must be a list of strings")),
    }
}

fn seconds(alias: &str, key: &str, value: Option<&Value>) -> Result<Option<Duration>, RemoteToolError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let secs = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|s| s.is_finite() && *s > 0.0)
    .ok_or_else(|| invalid(alias, format!("'{key}' must be a positive number of seconds")))?;
    Ok(Some(Duration::from_secs_f64(secs)))
}

/// Rewrite a URL path to the suffix the transport expects.
///
/// SSE endpoints end in `/mcp/sse`; streamable HTTP endpoints end in
/// `/mcp/stream`. A URL carrying the other transport's suffix has it swapped.
pub fn canonical_url(transport: TransportKind, url: &str) -> String {
    let normalized = url.trim().trim_end_matches('/');
    match transport {
        TransportKind::Sse => {
            let base = normalized.strip_suffix(STREAM_SUFFIX).unwrap_or(normalized);
            if base.ends_with(SSE_SUFFIX) {
                base.to_string()
            } else {
                format!("{base}{SSE_SUFFIX}")
            }
        }
        TransportKind::StreamableHttp => {
            let base = normalized.strip_suffix(SSE_SUFFIX).unwrap_or(normalized);
            if base.ends_with(STREAM_SUFFIX) {
                base.to_string()
            } else {
                format!("{base}{STREAM_SUFFIX}")
            }
        }
        TransportKind::Stdio => normalized.to_string(),
    }
}

/// The one alternate path tried when the canonical one answers 404.
///
/// Streamable HTTP servers commonly mount at `/mcp`, SSE servers at `/sse`.
pub fn alternate_url(transport: TransportKind, url: &str) -> Option<String> {
    let normalized = url.trim_end_matches('/');
    match transport {
        TransportKind::StreamableHttp => normalized
            .strip_suffix(STREAM_SUFFIX)
            .map(|base| format!("{base}/mcp")),
        TransportKind::Sse => normalized
            .strip_suffix(SSE_SUFFIX)
            .map(|base| format!("{base}/sse")),
        TransportKind::Stdio => None,
    }
}

/// Turn one raw server entry into a [`ServerConfig`].
pub fn sanitize_server_config(alias: &str, raw: &Value) -> Result<ServerConfig, RemoteToolError> {
    let object = raw
        .as_object()
        .ok_or_else(|| invalid(alias, "expected a mapping"))?;
    let map: Map<String, Value> = object
        .iter()
        .filter(|(_, v)| !is_blank(v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let transport_name = match map.get("transport") {
        Some(Value::String(name)) => name.trim().to_lowercase(),
        Some(other) => other.to_string(),
        None => infer_transport(&map),
    };
    let transport =
        TransportKind::parse(&transport_name).ok_or_else(|| RemoteToolError::UnsupportedTransport {
            alias: alias.to_string(),
            transport: transport_name.clone(),
        })?;

    let target = if transport.is_url_based() {
        let url = map.get("url").and_then(Value::as_str).ok_or_else(|| {
            invalid(
                alias,
                format!("configuration requires a valid URL for {transport} transport"),
            )
        })?;
        Target::Url(canonical_url(transport, url))
    } else {
        let command = map
            .get("command")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid(alias, "configuration requires a command for stdio transport"))?;
        Target::Command {
            command: command.to_string(),
            args: string_list(alias, map.get("args"))?,
            env: string_map(alias, "env", map.get("env"))?,
            cwd: map.get("cwd").and_then(Value::as_str).map(PathBuf::from),
        }
    };

    let headers = if transport.is_url_based() {
        string_map(alias, "headers", map.get("headers"))?
    } else {
        BTreeMap::new()
    };

    Ok(ServerConfig {
        transport,
        target,
        headers,
        token: map.get("token").and_then(Value::as_str).map(str::to_string),
        timeout: seconds(alias, "timeout", map.get("timeout"))?,
        connect_timeout: seconds(alias, "connect_timeout", map.get("connect_timeout"))?,
    })
}
