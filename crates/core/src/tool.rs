//! Tool trait: the abstraction over agent capabilities.
//!
//! Built-in tools (mail, spreadsheet, calendar, file helpers) and tools served
//! by remote tool servers both implement [`Tool`], so the reasoning loop
//! dispatches them through a single [`ToolRegistry`].

use crate::error::ToolError;
use crate::provider::ToolDefinition;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A request to execute a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the LLM's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    /// Whether the tool executed successfully
    pub success: bool,

    /// The output content
    pub output: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    /// A successful result whose output is the JSON rendering of `data`.
    pub fn json(data: serde_json::Value) -> Self {
        Self {
            call_id: String::new(),
            success: true,
            output: data.to_string(),
            data: Some(data),
        }
    }

    /// A successful plain-text result.
    pub fn text(output: impl Into<String>) -> Self {
        Self {
            call_id: String::new(),
            success: true,
            output: output.into(),
            data: None,
        }
    }

    /// A result reporting a failure the tool itself detected.
    pub fn failure(output: impl Into<String>) -> Self {
        Self {
            call_id: String::new(),
            success: false,
            output: output.into(),
            data: None,
        }
    }

    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = call_id.into();
        self
    }
}

/// Who a tool call is made on behalf of.
///
/// Credential-bound tools use `user_id` to look up tokens.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub user_id: String,
    pub agent_id: String,
    pub execution_id: Option<String>,
}

impl ToolContext {
    pub fn new(user_id: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            agent_id: agent_id.into(),
            execution_id: None,
        }
    }
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "gmail", "csv").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Free-form metadata (remote tools expose server annotations here).
    fn metadata(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    /// Execute the tool with a single structured argument.
    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools, keyed by name.
///
/// Built once and passed by reference; a per-run registry is derived from it
/// with [`ToolRegistry::select`] and extended with remote tools.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Register a tool unless the name is already taken. Returns whether it was added.
    pub fn register_if_absent(&mut self, tool: Arc<dyn Tool>) -> bool {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return false;
        }
        self.tools.insert(name, tool);
        true
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// A new registry holding only the named tools that exist here.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Self {
        let tools = names
            .iter()
            .filter_map(|n| {
                self.tools
                    .get_key_value(n.as_ref())
                    .map(|(k, v)| (k.clone(), v.clone()))
            })
            .collect();
        Self { tools }
    }

    /// Get all tool definitions (for sending to the LLM), ordered by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// Execute a tool call.
    pub async fn execute(
        &self,
        ctx: &ToolContext,
        call: &ToolCall,
    ) -> std::result::Result<ToolResult, ToolError> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
        let result = tool.execute(ctx, call.arguments.clone()).await?;
        Ok(result.with_call_id(&call.id))
    }

    /// All registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}
