//! Tool invocation adapter.
//!
//! Turns a model-issued tool call into an observation string. Nothing that
//! happens here fails the run: unknown tools, unparseable arguments,
//! schema violations and tool errors all come back as text the model can
//! read and react to.

use agentexec_core::error::ToolError;
use agentexec_core::event::{DomainEvent, EventBus};
use agentexec_core::message::MessageToolCall;
use agentexec_core::tool::{ToolContext, ToolRegistry, ToolResult};
use agentexec_tools::{parse_tool_input, validate_parameters};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

/// What one tool call produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub tool: String,
    pub call_id: String,
    pub success: bool,
    pub observation: String,
}

/// Dispatches tool calls against one run's toolset.
pub struct ToolInvoker {
    tools: ToolRegistry,
    ctx: ToolContext,
    event_bus: Option<Arc<EventBus>>,
}

impl ToolInvoker {
    pub fn new(tools: ToolRegistry, ctx: ToolContext) -> Self {
        Self {
            tools,
            ctx,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run one call. Never fails; the observation describes any problem.
    pub async fn invoke(&self, call: &MessageToolCall) -> Invocation {
        let start = Instant::now();
        let (success, observation) = self.dispatch(call, start).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::ToolExecuted {
                execution_id: self.ctx.execution_id.clone(),
                tool_name: call.name.clone(),
                success,
                duration_ms,
                timestamp: chrono::Utc::now(),
            });
        }

        Invocation {
            tool: call.name.clone(),
            call_id: call.id.clone(),
            success,
            observation,
        }
    }

    async fn dispatch(&self, call: &MessageToolCall, start: Instant) -> (bool, String) {
        let Some(tool) = self.tools.get(&call.name) else {
            warn!(tool = %call.name, "Model requested an unknown tool");
            return (false, execution_failed(&ToolError::NotFound(call.name.clone())));
        };

        let arguments = match parse_tool_input(&call.name, &call.arguments) {
            Ok(map) => Value::Object(map),
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool arguments could not be parsed");
                return (false, e.to_string());
            }
        };

        if let Err(e) = validate_parameters(&tool.parameters_schema(), &arguments) {
            warn!(
                tool = %call.name,
                user_id = %self.ctx.user_id,
                error = %e,
                "Tool validation error"
            );
            return (false, validation_failed(&e));
        }

        debug!(tool = %call.name, call_id = %call.id, "Invoking tool");
        match tool.execute(&self.ctx, arguments).await {
            Ok(result) => {
                let success = result.success;
                (success, render_result(result, start.elapsed().as_secs_f64()))
            }
            Err(e @ (ToolError::Validation(_) | ToolError::InvalidArguments(_))) => {
                warn!(tool = %call.name, error = %e, "Tool rejected its arguments");
                (false, validation_failed(&e))
            }
            Err(e) => {
                error!(
                    tool = %call.name,
                    user_id = %self.ctx.user_id,
                    error = %e,
                    "Tool execution failed"
                );
                (false, execution_failed(&e))
            }
        }
    }
}

fn validation_failed(e: &ToolError) -> String {
    format!("Tool validation error: {e}")
}

fn execution_failed(e: &ToolError) -> String {
    format!("Tool execution failed: {e}")
}

/// The JSON envelope the model sees for a completed call.
fn render_result(result: ToolResult, execution_time: f64) -> String {
    let error = if result.success {
        Value::Null
    } else {
        Value::String(result.output.clone())
    };
    let payload = match result.data {
        Some(data) => data,
        None if result.success => Value::String(result.output),
        None => Value::Null,
    };
    json!({
        "success": result.success,
        "result": payload,
        "execution_time": execution_time,
        "error": error,
    })
    .to_string()
}
