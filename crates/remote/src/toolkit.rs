//! Per-run aggregation of tools from every configured remote server.

use crate::config::{ConnectionSpec, RemoteSettings, sanitize_server_config};
use crate::filter::{Candidate, ToolFilter};
use crate::session::RemoteSession;
use crate::tool::RemoteTool;
use agentexec_core::error::RemoteToolError;
use agentexec_core::tool::Tool;
use futures::future::join_all;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Connections and tools acquired for one run.
///
/// Servers that fail are recorded in [`failures`](Self::failures) and
/// contribute nothing; the rest stay usable. Call [`shutdown`](Self::shutdown)
/// when the run ends.
#[derive(Default)]
pub struct RemoteToolkit {
    sessions: Vec<Arc<RemoteSession>>,
    tools: Vec<Arc<dyn Tool>>,
    failures: Vec<RemoteToolError>,
}

struct ServerTools {
    session: Arc<RemoteSession>,
    tools: Vec<RemoteTool>,
}

async fn connect_server(
    alias: &str,
    raw: &Value,
    settings: &RemoteSettings,
) -> Result<ServerTools, RemoteToolError> {
    let server = sanitize_server_config(alias, raw)?;
    let spec = ConnectionSpec::new(alias, server, settings);
    let session = Arc::new(RemoteSession::open(&spec).await?);

    match session.list_tools().await {
        Ok(infos) => {
            debug!(
                alias = %alias,
                tool_names = ?infos.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
                "Received tool metadata from remote tool server"
            );
            let tools = infos
                .into_iter()
                .map(|info| RemoteTool::new(info, session.clone(), spec.request_timeout))
                .collect();
            Ok(ServerTools { session, tools })
        }
        Err(e) => {
            session.close().await;
            Err(e)
        }
    }
}

fn log_failure(alias: &str, error: &RemoteToolError) {
    match error {
        RemoteToolError::Http { status, .. } => warn!(
            alias = %alias,
            status_code = status,
            "Remote tool server responded with HTTP error"
        ),
        RemoteToolError::UnsupportedTransport { transport, .. } => warn!(
            alias = %alias,
            transport = %transport,
            "Skipping remote tool server with unsupported transport"
        ),
        other => warn!(
            alias = %alias,
            error = %other,
            "Failed to initialise remote tool server"
        ),
    }
}

impl RemoteToolkit {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Connect to every server concurrently and keep the tools that pass `filter`.
    ///
    /// Never fails as a whole: per-server errors are logged and collected.
    /// When two servers offer the same tool name, the server whose alias
    /// sorts first wins.
    pub async fn connect(
        servers: &BTreeMap<String, Value>,
        filter: &ToolFilter,
        settings: &RemoteSettings,
    ) -> Self {
        if servers.is_empty() {
            return Self::empty();
        }

        let attempts = servers.iter().map(|(alias, raw)| async move {
            let discovery = connect_server(alias, raw, settings);
            let outcome = tokio::time::timeout(settings.discovery_budget, discovery)
                .await
                .unwrap_or_else(|_| {
                    Err(RemoteToolError::Timeout {
                        alias: alias.clone(),
                    })
                });
            (alias, outcome)
        });
        let outcomes = join_all(attempts).await;

        let mut toolkit = Self::empty();
        let mut offered: Vec<RemoteTool> = Vec::new();
        for (alias, outcome) in outcomes {
            match outcome {
                Ok(server) => {
                    toolkit.sessions.push(server.session);
                    offered.extend(server.tools);
                }
                Err(e) => {
                    log_failure(alias, &e);
                    toolkit.failures.push(e);
                }
            }
        }

        let mut seen = BTreeSet::new();
        offered.retain(|tool| {
            let fresh = seen.insert(tool.name().to_string());
            if !fresh {
                warn!(
                    alias = %tool.server_alias(),
                    tool = %tool.name(),
                    "Duplicate remote tool name, keeping the first"
                );
            }
            fresh
        });

        let metadata: Vec<Value> = offered.iter().map(|t| t.metadata()).collect();
        let candidates: Vec<Candidate<'_>> = offered
            .iter()
            .zip(&metadata)
            .map(|(tool, metadata)| Candidate {
                name: tool.name(),
                metadata,
            })
            .collect();
        let keep: BTreeSet<usize> = filter.select(&candidates).into_iter().collect();

        if !filter.names.is_empty() {
            let selected = keep.iter().map(|&i| candidates[i].name);
            let missing = filter.missing(selected, &candidates);
            if !missing.is_empty() {
                info!(missing = ?missing, "Some remote tools requested in configuration were not found");
            }
        }
        if !filter.is_empty() && keep.is_empty() && !offered.is_empty() {
            warn!(
                available = ?candidates.iter().map(|c| c.name).collect::<Vec<_>>(),
                filter_names = ?filter.names,
                filter_categories = ?filter.categories,
                "No remote tools matched filters"
            );
            toolkit.failures.push(RemoteToolError::NoToolsMatched);
        }
        drop(candidates);

        toolkit.tools = offered
            .into_iter()
            .enumerate()
            .filter(|(index, _)| keep.contains(index))
            .map(|(_, tool)| Arc::new(tool) as Arc<dyn Tool>)
            .collect();

        info!(
            servers = servers.len(),
            connected = toolkit.sessions.len(),
            tools = toolkit.tools.len(),
            "Remote tools attached"
        );
        toolkit
    }

    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    pub fn failures(&self) -> &[RemoteToolError] {
        &self.failures
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Close every session. Tools from this toolkit stop working afterwards.
    pub async fn shutdown(self) {
        join_all(self.sessions.iter().map(|s| s.close())).await;
        debug!(sessions = self.sessions.len(), "Remote tool sessions closed");
    }
}

impl std::fmt::Debug for RemoteToolkit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteToolkit")
            .field("sessions", &self.sessions)
            .field("tools", &self.tools.iter().map(|t| t.name()).collect::<Vec<_>>())
            .field("failures", &self.failures)
            .finish()
    }
}
