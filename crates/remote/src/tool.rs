//! Remote tools exposed through the common [`Tool`] trait.

use crate::protocol::RemoteToolInfo;
use crate::session::RemoteSession;
use agentexec_core::error::{RemoteToolError, ToolError};
use agentexec_core::tool::{Tool, ToolContext, ToolResult};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// One tool served by a remote server. Calls go through the shared session.
pub struct RemoteTool {
    info: RemoteToolInfo,
    description: String,
    session: Arc<RemoteSession>,
    request_timeout: Duration,
}

impl RemoteTool {
    pub fn new(info: RemoteToolInfo, session: Arc<RemoteSession>, request_timeout: Duration) -> Self {
        let description = info
            .description
            .clone()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| format!("Remote tool '{}' from server '{}'", info.name, session.alias()));
        Self {
            info,
            description,
            session,
            request_timeout,
        }
    }

    pub fn server_alias(&self) -> &str {
        self.session.alias()
    }
}

#[async_trait]
impl Tool for RemoteTool {
    fn name(&self) -> &str {
        &self.info.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        match &self.info.input_schema {
            Some(schema) if schema.is_object() => schema.clone(),
            _ => json!({"type": "object", "properties": {}}),
        }
    }

    fn metadata(&self) -> Value {
        json!({
            "server": self.session.alias(),
            "annotations": self.info.annotations.clone().unwrap_or(Value::Null),
            "_meta": self.info.meta.clone().unwrap_or(Value::Null),
        })
    }

    async fn execute(&self, _ctx: &ToolContext, arguments: Value) -> Result<ToolResult, ToolError> {
        let arguments = match arguments {
            Value::Null => json!({}),
            Value::Object(map) => Value::Object(map),
            other => {
                return Err(ToolError::InvalidArguments(format!(
                    "remote tool '{}' expects an object argument, got {other}",
                    self.info.name
                )));
            }
        };

        debug!(alias = %self.session.alias(), tool = %self.info.name, "Calling remote tool");
        let result = self
            .session
            .call_tool(&self.info.name, arguments)
            .await
            .map_err(|e| match e {
                RemoteToolError::Timeout { .. } => ToolError::Timeout {
                    tool_name: self.info.name.clone(),
                    timeout_secs: self.request_timeout.as_secs(),
                },
                other => ToolError::failed(&self.info.name, other.to_string()),
            })?;

        let text = result.text();
        if result.is_error {
            return Ok(ToolResult::failure(text));
        }
        Ok(ToolResult {
            call_id: String::new(),
            success: true,
            output: text,
            data: result.structured_content,
        })
    }
}
